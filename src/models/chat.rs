use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message scoped to one document room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
