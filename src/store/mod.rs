pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::ChatMessage;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// A document as persisted: the CRDT snapshot plus its title.
///
/// An empty `state` is legal: the document row exists but no edit has been
/// saved yet.
#[derive(Debug, Clone, Default)]
pub struct StoredDocument {
    pub state: Vec<u8>,
    pub title: String,
}

/// Durable storage for document snapshots and titles.
///
/// Creating document rows is the job of the external CRUD API; this interface
/// only loads what exists and updates it. Callers do not retry failed saves;
/// the in-memory room remains authoritative until the next save attempt.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document, or `None` if it does not exist
    async fn load_document(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Persist the full encoded CRDT state of a document
    async fn save_document_state(&self, document_id: &str, state: &[u8]) -> Result<(), StoreError>;

    /// Persist a new title for a document
    async fn save_document_title(&self, document_id: &str, title: &str) -> Result<(), StoreError>;
}

/// Durable storage for per-document chat history
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Load the chat history of a document, oldest first
    async fn load_messages(&self, document_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Append one message to a document's chat history
    async fn append_message(
        &self,
        document_id: &str,
        message: &ChatMessage,
    ) -> Result<(), StoreError>;
}
