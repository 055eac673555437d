use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ChatStore, DocumentStore, StoreError, StoredDocument};
use crate::models::ChatMessage;

/// In-memory store used when no database URL is configured, and by tests.
///
/// Matches the Postgres implementation's semantics: saving state or title for
/// an unknown document is a no-op, since row creation belongs to the external
/// CRUD API.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
    messages: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document as if the CRUD API had created it
    pub async fn insert_document(&self, document_id: &str, document: StoredDocument) {
        self.documents
            .write()
            .await
            .insert(document_id.to_string(), document);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_document(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.documents.read().await.get(document_id).cloned())
    }

    async fn save_document_state(&self, document_id: &str, state: &[u8]) -> Result<(), StoreError> {
        if let Some(doc) = self.documents.write().await.get_mut(document_id) {
            doc.state = state.to_vec();
        }
        Ok(())
    }

    async fn save_document_title(&self, document_id: &str, title: &str) -> Result<(), StoreError> {
        if let Some(doc) = self.documents.write().await.get_mut(document_id) {
            doc.title = title.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn load_messages(&self, document_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_message(
        &self,
        document_id: &str,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        self.messages
            .write()
            .await
            .entry(document_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn load_missing_document_is_none() {
        let store = MemoryStore::new();
        assert!(store.load_document("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_unknown_document_does_not_create_it() {
        let store = MemoryStore::new();
        store.save_document_state("ghost", &[1, 2, 3]).await.unwrap();
        store.save_document_title("ghost", "Boo").await.unwrap();
        assert!(store.load_document("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn state_and_title_roundtrip() {
        let store = MemoryStore::new();
        store
            .insert_document(
                "d1",
                StoredDocument {
                    state: Vec::new(),
                    title: "Untitled Document".to_string(),
                },
            )
            .await;

        store.save_document_state("d1", &[9, 9]).await.unwrap();
        store.save_document_title("d1", "Report").await.unwrap();

        let doc = store.load_document("d1").await.unwrap().unwrap();
        assert_eq!(doc.state, vec![9, 9]);
        assert_eq!(doc.title, "Report");
    }

    #[tokio::test]
    async fn chat_history_preserves_order() {
        let store = MemoryStore::new();
        for text in ["first", "second"] {
            store
                .append_message(
                    "d1",
                    &ChatMessage {
                        username: "alice".to_string(),
                        message: text.to_string(),
                        timestamp: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let messages = store.load_messages("d1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "first");
        assert_eq!(messages[1].message, "second");
    }
}
