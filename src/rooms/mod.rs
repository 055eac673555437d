pub mod presence;
pub mod registry;
pub mod room;

pub use registry::{RegistryError, RegistryStats, RoomRegistry};
pub use room::{ConnectionId, DetachOutcome, OutboundTx, Room, RoomClosed};
