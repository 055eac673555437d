use serde::{Deserialize, Serialize};

/// Display attributes of a participant in a document room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
    pub colour: String,
}
