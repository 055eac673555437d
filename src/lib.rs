pub mod auth;
pub mod config;
pub mod crdt;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod rooms;
pub mod routes;
pub mod store;
pub mod ws;

use std::sync::Arc;

use config::Config;
use ws::SessionCoordinator;

/// Shared application state handed to every HTTP and WebSocket handler.
pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<SessionCoordinator>,
}
