use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::presence;
use crate::crdt::{CrdtDoc, CrdtError};
use crate::models::{Member, ServerEvent, UpdateMessage};
use crate::store::DocumentStore;

pub type ConnectionId = String;
pub type OutboundTx = mpsc::UnboundedSender<ServerEvent>;

/// Returned by `try_join` when the room lost the race against a teardown;
/// the caller should go back to the registry for a fresh room.
#[derive(Debug)]
pub struct RoomClosed;

/// Post-removal occupancy of a room, used by the leave and disconnect paths
/// to decide whether the room should be torn down.
#[derive(Debug, Clone, Copy)]
pub struct DetachOutcome {
    pub occupants_remaining: usize,
    pub members_remaining: usize,
}

struct RoomInner {
    /// The transport room: every connection joined to this document and the
    /// sender used to reach it. Broadcast audience and occupancy source.
    occupants: HashMap<ConnectionId, OutboundTx>,
    /// Presence entries, deduplicated by the username merge policy.
    members: HashMap<ConnectionId, Member>,
    /// Set once by teardown; joins observing it must retry via the registry.
    closed: bool,
}

/// In-memory session state for one active document.
///
/// The CRDT handle, presence maps and autosave task are owned exclusively by
/// the room; all mutation goes through these methods, serialized per room by
/// the two internal locks. Lock order is doc before inner; no path takes the
/// doc lock while holding inner.
pub struct Room {
    document_id: String,
    doc: Mutex<CrdtDoc>,
    title: RwLock<String>,
    inner: Mutex<RoomInner>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl Room {
    pub(crate) fn new(document_id: String, doc: CrdtDoc, title: String) -> Arc<Self> {
        Arc::new(Self {
            document_id,
            doc: Mutex::new(doc),
            title: RwLock::new(title),
            inner: Mutex::new(RoomInner {
                occupants: HashMap::new(),
                members: HashMap::new(),
                closed: false,
            }),
            autosave: Mutex::new(None),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub async fn title(&self) -> String {
        self.title.read().await.clone()
    }

    pub async fn set_title(&self, title: &str) {
        *self.title.write().await = title.to_string();
    }

    /// Join a connection to the transport room, merge its presence entry and
    /// broadcast the updated user list to everyone in the room, joiner
    /// included.
    pub async fn try_join(
        &self,
        connection_id: &str,
        tx: OutboundTx,
        member: Member,
    ) -> Result<(), RoomClosed> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(RoomClosed);
        }

        inner.occupants.insert(connection_id.to_string(), tx);
        presence::merge_member(&mut inner.members, connection_id, member);

        let users: Vec<Member> = inner.members.values().cloned().collect();
        debug!(
            "users in room {}: {:?}",
            self.document_id,
            users.iter().map(|u| &u.username).collect::<Vec<_>>()
        );
        Self::send_filtered(&inner, None, &ServerEvent::UpdateUsers { users });
        Ok(())
    }

    /// Remove a connection from the transport room and the presence map,
    /// broadcasting the updated user list to whoever remains.
    pub async fn detach(&self, connection_id: &str) -> DetachOutcome {
        let mut inner = self.inner.lock().await;
        let was_occupant = inner.occupants.remove(connection_id).is_some();
        let had_entry = inner.members.remove(connection_id).is_some();

        if was_occupant || had_entry {
            let users: Vec<Member> = inner.members.values().cloned().collect();
            Self::send_filtered(&inner, None, &ServerEvent::UpdateUsers { users });
        }

        DetachOutcome {
            occupants_remaining: inner.occupants.len(),
            members_remaining: inner.members.len(),
        }
    }

    /// Apply an opaque update to the document and relay the same bytes to
    /// every other connection in the room. Holding the doc lock across the
    /// broadcast keeps relay order identical to application order.
    pub async fn relay_update(&self, sender_id: &str, update: &[u8]) -> Result<(), CrdtError> {
        let doc = self.doc.lock().await;
        doc.apply_update(update)?;

        let inner = self.inner.lock().await;
        let event = ServerEvent::Update(UpdateMessage {
            update: update.to_vec(),
        });
        Self::send_filtered(&inner, Some(sender_id), &event);
        Ok(())
    }

    /// Encode the full document state for persistence or a new joiner
    pub async fn encode_state(&self) -> Result<Vec<u8>, CrdtError> {
        self.doc.lock().await.encode_state()
    }

    /// Send an event to every connection in the room
    pub async fn broadcast(&self, event: &ServerEvent) {
        let inner = self.inner.lock().await;
        Self::send_filtered(&inner, None, event);
    }

    /// Send an event to every connection in the room except the sender
    pub async fn broadcast_except(&self, sender_id: &str, event: &ServerEvent) {
        let inner = self.inner.lock().await;
        Self::send_filtered(&inner, Some(sender_id), event);
    }

    pub async fn occupant_count(&self) -> usize {
        self.inner.lock().await.occupants.len()
    }

    fn send_filtered(inner: &RoomInner, skip: Option<&str>, event: &ServerEvent) {
        for (connection_id, tx) in &inner.occupants {
            if skip == Some(connection_id.as_str()) {
                continue;
            }
            // A closed receiver belongs to a connection mid-teardown; skip it.
            let _ = tx.send(event.clone());
        }
    }

    /// Start the recurring save task for this room. Called exactly once, at
    /// room creation. The task holds a weak reference so a torn-down room is
    /// not kept alive by its own timer.
    pub(crate) async fn start_autosave(
        self: &Arc<Self>,
        documents: Arc<dyn DocumentStore>,
        interval: Duration,
    ) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(room) = weak.upgrade() else { break };

                let state = match room.encode_state().await {
                    Ok(state) => state,
                    Err(e) => {
                        error!("failed to encode {} for auto-save: {}", room.document_id, e);
                        continue;
                    }
                };

                debug!("auto-saving document {}", room.document_id);
                if let Err(e) = documents.save_document_state(&room.document_id, &state).await {
                    error!("auto-save failed for document {}: {}", room.document_id, e);
                }
            }
        });

        *self.autosave.lock().await = Some(handle);
    }

    /// Cancel the autosave task. Idempotent: cancelling an already-cancelled
    /// timer is a no-op.
    pub(crate) async fn stop_autosave(&self) {
        if let Some(handle) = self.autosave.lock().await.take() {
            handle.abort();
        }
    }

    /// Mark the room as closed so late joiners retry through the registry
    pub(crate) async fn close(&self) {
        self.inner.lock().await.closed = true;
    }
}
