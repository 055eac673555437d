pub mod diagnostics;
pub mod health;

pub use diagnostics::diagnostics;
pub use health::{health_check, ready_check};
