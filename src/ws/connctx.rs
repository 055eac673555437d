use std::collections::HashSet;

use uuid::Uuid;

use crate::models::ServerEvent;
use crate::rooms::OutboundTx;

/// Per-connection session state, owned by the connection's read loop.
pub struct ConnCtx {
    pub connection_id: String,
    /// Sender feeding this connection's writer task.
    pub tx: OutboundTx,
    /// Documents this connection has joined. Makes joins idempotent and
    /// drives the disconnect sweep.
    pub joined_documents: HashSet<String>,
    /// Document the update relay is bound to. Bound once, on the first
    /// successful join, so a connection cannot grow duplicate relays.
    pub update_relay: Option<String>,
}

impl ConnCtx {
    pub fn new(tx: OutboundTx) -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string(),
            tx,
            joined_documents: HashSet::new(),
            update_relay: None,
        }
    }

    /// Queue an event for this connection. A send failure means the writer
    /// task is gone and the connection is tearing down.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }
}
