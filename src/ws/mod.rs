pub mod connctx;
pub mod coordinator;
pub mod handler;

pub use connctx::ConnCtx;
pub use coordinator::SessionCoordinator;
pub use handler::websocket_handler;
