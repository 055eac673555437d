use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::connctx::ConnCtx;
use crate::auth::AccessPolicy;
use crate::models::{
    AwarenessMessage, ChatMessage, ChatSendMessage, ClientEvent, DocumentErrorMessage, ErrorCode,
    InitialStateMessage, JoinMessage, Member, PongMessage, ServerEvent, TitleMessage,
    UpdateMessage,
};
use crate::rooms::{RegistryError, RoomRegistry};
use crate::store::{ChatStore, DocumentStore};

/// Turns inbound connection events into room mutations, store calls and
/// outbound broadcasts. One instance is shared by every connection; all
/// per-document serialization lives in the rooms themselves.
pub struct SessionCoordinator {
    registry: RoomRegistry,
    documents: Arc<dyn DocumentStore>,
    chat: Arc<dyn ChatStore>,
    access: Arc<dyn AccessPolicy>,
}

impl SessionCoordinator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        chat: Arc<dyn ChatStore>,
        access: Arc<dyn AccessPolicy>,
        autosave_interval: Duration,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(documents.clone(), autosave_interval),
            documents,
            chat,
            access,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, ctx: &mut ConnCtx, event: ClientEvent) {
        match event {
            ClientEvent::Join(msg) => self.handle_join(ctx, msg).await,
            ClientEvent::Update(msg) => self.handle_update(ctx, msg).await,
            ClientEvent::Awareness(msg) => self.handle_awareness(ctx, msg).await,
            ClientEvent::UpdateTitle(msg) => self.handle_title(ctx, msg).await,
            ClientEvent::SendMessage(msg) => self.handle_chat(ctx, msg).await,
            ClientEvent::Leave(msg) => self.handle_leave(ctx, msg.document_id).await,
            ClientEvent::Ping => self.handle_ping(ctx),
        }
    }

    async fn handle_join(&self, ctx: &mut ConnCtx, msg: JoinMessage) {
        let JoinMessage {
            document_id,
            username,
            colour,
        } = msg;
        info!(
            "user {}, {}, attempting to join document: {}",
            username, colour, document_id
        );

        if ctx.joined_documents.contains(&document_id) {
            debug!(
                "connection {} already joined {}, skipping",
                ctx.connection_id, document_id
            );
            return;
        }
        ctx.joined_documents.insert(document_id.clone());

        if !self.access.allows(&document_id, &username).await {
            warn!(
                "access denied for {} on document {}",
                username, document_id
            );
            ctx.send(ServerEvent::DocumentError(DocumentErrorMessage {
                error: "Access denied".to_string(),
                code: ErrorCode::AccessDenied,
            }));
            return;
        }

        // Acquire the room, retrying once more if a concurrent teardown
        // closed it between the registry lookup and our join.
        let room = loop {
            let room = match self.registry.get_or_create(&document_id).await {
                Ok((room, _created)) => room,
                Err(RegistryError::NotFound) => {
                    warn!("document {} could not be loaded", document_id);
                    ctx.send(Self::not_found_error());
                    return;
                }
                Err(e) => {
                    error!("error handling document {}: {}", document_id, e);
                    ctx.send(Self::not_found_error());
                    return;
                }
            };

            let member = Member {
                username: username.clone(),
                colour: colour.clone(),
            };
            match room
                .try_join(&ctx.connection_id, ctx.tx.clone(), member)
                .await
            {
                Ok(()) => break room,
                Err(_closed) => {
                    debug!("room {} closed mid-join, reloading", document_id);
                    continue;
                }
            }
        };

        // Initial payloads go to the joiner only.
        match room.encode_state().await {
            Ok(state) => ctx.send(ServerEvent::InitialState(InitialStateMessage { state })),
            Err(e) => error!("failed to encode initial state of {}: {}", document_id, e),
        }
        ctx.send(ServerEvent::UpdateTitle {
            title: room.title().await,
        });
        match self.chat.load_messages(&document_id).await {
            Ok(messages) => ctx.send(ServerEvent::LoadMessages { messages }),
            Err(e) => error!("error loading chat for {}: {}", document_id, e),
        }

        if ctx.update_relay.is_none() {
            ctx.update_relay = Some(document_id.clone());
        }
        info!(
            "connection {} joined document room: {}",
            ctx.connection_id, document_id
        );
    }

    async fn handle_update(&self, ctx: &ConnCtx, msg: UpdateMessage) {
        let Some(document_id) = ctx.update_relay.as_deref() else {
            debug!(
                "update from {} before any join, dropping",
                ctx.connection_id
            );
            return;
        };
        let Some(room) = self.registry.get(document_id) else {
            debug!("update for inactive document {}, dropping", document_id);
            return;
        };

        if let Err(e) = room.relay_update(&ctx.connection_id, &msg.update).await {
            error!("failed to apply update to document {}: {}", document_id, e);
        }
    }

    async fn handle_awareness(&self, ctx: &ConnCtx, msg: AwarenessMessage) {
        // Ephemeral cursor/selection state: relayed verbatim, never stored.
        let Some(room) = self.registry.get(&msg.document_id) else {
            return;
        };
        room.broadcast_except(
            &ctx.connection_id,
            &ServerEvent::Awareness { update: msg.update },
        )
        .await;
    }

    async fn handle_title(&self, _ctx: &ConnCtx, msg: TitleMessage) {
        let (Some(document_id), Some(title)) =
            (non_empty(msg.document_id), non_empty(msg.title))
        else {
            warn!("invalid title update request");
            return;
        };

        let Some(room) = self.registry.get(&document_id) else {
            warn!("title update for inactive document {}", document_id);
            return;
        };

        info!("title updated: {}", title);
        room.set_title(&title).await;
        room.broadcast(&ServerEvent::UpdateTitle {
            title: title.clone(),
        })
        .await;

        // The in-memory title stays authoritative even if this write fails.
        let documents = self.documents.clone();
        tokio::spawn(async move {
            if let Err(e) = documents.save_document_title(&document_id, &title).await {
                error!("failed to update document title: {}", e);
            }
        });
    }

    async fn handle_chat(&self, _ctx: &ConnCtx, msg: ChatSendMessage) {
        let (Some(document_id), Some(username), Some(message)) = (
            non_empty(msg.document_id),
            non_empty(msg.username),
            non_empty(msg.message),
        ) else {
            return;
        };

        let chat_message = ChatMessage {
            username,
            message,
            timestamp: Utc::now(),
        };

        // Chat delivery is best-effort: the broadcast goes out after the
        // persistence attempt whether or not it succeeded.
        if let Err(e) = self.chat.append_message(&document_id, &chat_message).await {
            error!("failed to save chat message: {}", e);
        }
        if let Some(room) = self.registry.get(&document_id) {
            room.broadcast(&ServerEvent::ReceiveMessage {
                message: chat_message,
            })
            .await;
        }
    }

    async fn handle_leave(&self, ctx: &mut ConnCtx, document_id: String) {
        info!(
            "connection {} explicitly leaving document room: {}",
            ctx.connection_id, document_id
        );
        let Some(room) = self.registry.get(&document_id) else {
            return;
        };

        let outcome = room.detach(&ctx.connection_id).await;
        if outcome.members_remaining == 0 {
            info!("last user left room {}, cleaning up", document_id);
            self.registry.teardown(&document_id).await;
        }
    }

    /// Transport-initiated teardown sweep: the connection dropped without an
    /// explicit leave. Reaches the same end state as the explicit-leave path
    /// for the last-one-out case, through the registry's single teardown
    /// entry point.
    pub async fn handle_disconnect(&self, ctx: &mut ConnCtx) {
        info!("connection {} disconnected", ctx.connection_id);

        for document_id in std::mem::take(&mut ctx.joined_documents) {
            let Some(room) = self.registry.get(&document_id) else {
                continue;
            };

            let outcome = room.detach(&ctx.connection_id).await;
            if outcome.occupants_remaining == 0 {
                info!(
                    "last user leaving room {}, saving and cleaning up",
                    document_id
                );
                self.registry.teardown(&document_id).await;
            } else {
                debug!("other users in room {}, no clean up needed", document_id);
            }
        }
    }

    fn handle_ping(&self, ctx: &ConnCtx) {
        ctx.send(ServerEvent::Pong(PongMessage {
            date: Utc::now().to_rfc3339(),
        }));
    }

    fn not_found_error() -> ServerEvent {
        ServerEvent::DocumentError(DocumentErrorMessage {
            error: "Document not found".to_string(),
            code: ErrorCode::DocumentNotFound,
        })
    }
}

/// A missing or empty field rejects the whole event.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
