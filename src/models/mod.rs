pub mod chat;
pub mod diagnostics;
pub mod health;
pub mod messages;
pub mod presence;

pub use chat::*;
pub use diagnostics::*;
pub use health::*;
pub use messages::*;
pub use presence::*;
