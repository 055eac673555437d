use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::connctx::ConnCtx;
use crate::models::{ClientEvent, ServerEvent};
use crate::AppState;

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one WebSocket connection: a writer task drains the connection's
/// outbound queue while the read loop below dispatches inbound events into
/// the coordinator. The disconnect sweep runs whichever way the loop ends.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut ctx = ConnCtx::new(tx);
    info!("User connected: {}", ctx.connection_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to serialize outbound event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let coordinator = state.coordinator.clone();
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    // Malformed frames are dropped with a log line; nothing
                    // is echoed back to the client.
                    let event = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(
                                "failed to parse message from {}: {}",
                                ctx.connection_id, e
                            );
                            continue;
                        }
                    };
                    coordinator.dispatch(&mut ctx, event).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                // The protocol is text frames only; axum answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("websocket error on {}: {}", ctx.connection_id, e);
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    coordinator.handle_disconnect(&mut ctx).await;
    send_task.abort();
    info!("User disconnected: {}", ctx.connection_id);
}
