use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::room::Room;
use crate::crdt::{CrdtDoc, CrdtError};
use crate::store::{DocumentStore, StoreError};

#[derive(Debug)]
pub enum RegistryError {
    /// The document store has no row for this id; room creation belongs to
    /// the external CRUD API, so the registry refuses to fabricate one.
    NotFound,
    Store(StoreError),
    Codec(CrdtError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotFound => write!(f, "Document not found"),
            RegistryError::Store(e) => write!(f, "{}", e),
            RegistryError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Counts reported by the diagnostics endpoint
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    pub rooms: usize,
    pub connections: usize,
}

/// The authoritative map from document id to its active room.
///
/// Lookup, insert and removal are concurrent across different document ids;
/// only same-id creation is serialized, through a per-id lock, so a burst of
/// joins for one document produces exactly one store load and one room.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    create_locks: DashMap<String, Arc<Mutex<()>>>,
    documents: Arc<dyn DocumentStore>,
    autosave_interval: Duration,
}

impl RoomRegistry {
    pub fn new(documents: Arc<dyn DocumentStore>, autosave_interval: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            create_locks: DashMap::new(),
            documents,
            autosave_interval,
        }
    }

    /// Return the active room for a document, loading and creating it if this
    /// is the first join. The boolean reports whether the room was created by
    /// this call.
    pub async fn get_or_create(
        &self,
        document_id: &str,
    ) -> Result<(Arc<Room>, bool), RegistryError> {
        if let Some(room) = self.rooms.get(document_id) {
            return Ok((room.value().clone(), false));
        }

        let lock = self
            .create_locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another join may have finished creating while we waited.
        if let Some(room) = self.rooms.get(document_id) {
            return Ok((room.value().clone(), false));
        }

        let stored = self
            .documents
            .load_document(document_id)
            .await
            .map_err(RegistryError::Store)?;
        let Some(stored) = stored else {
            return Err(RegistryError::NotFound);
        };

        let doc = CrdtDoc::from_snapshot(&stored.state).map_err(RegistryError::Codec)?;
        let room = Room::new(document_id.to_string(), doc, stored.title);
        room.start_autosave(self.documents.clone(), self.autosave_interval)
            .await;

        self.rooms.insert(document_id.to_string(), room.clone());
        self.create_locks.remove(document_id);
        info!("document {} loaded into a new room", document_id);

        Ok((room, true))
    }

    /// Look up an active room without creating one
    pub fn get(&self, document_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(document_id).map(|room| room.value().clone())
    }

    /// End a room's lifecycle: cancel its autosave timer, persist its final
    /// state once and drop it from the registry.
    ///
    /// Both the explicit-leave and the disconnect-sweep paths call this; the
    /// atomic removal below is the claim that lets only the first caller save,
    /// while the second observes "already gone" and no-ops. Removing the entry
    /// before the final save also means a join racing this teardown reloads
    /// fresh instead of entering a dying room.
    pub async fn teardown(&self, document_id: &str) {
        let Some((_, room)) = self.rooms.remove(document_id) else {
            debug!("room {} already torn down", document_id);
            return;
        };

        room.close().await;
        room.stop_autosave().await;

        match room.encode_state().await {
            Ok(state) => {
                if let Err(e) = self.documents.save_document_state(document_id, &state).await {
                    error!("final save failed for document {}: {}", document_id, e);
                } else {
                    info!("document {} saved when all users have left", document_id);
                }
            }
            Err(e) => error!("failed to encode final state of {}: {}", document_id, e),
        }
    }

    pub async fn stats(&self) -> RegistryStats {
        // Snapshot the rooms first; counting occupants awaits each room's
        // lock and must not hold a map shard meanwhile.
        let rooms: Vec<Arc<Room>> = self
            .rooms
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut connections = 0;
        for room in &rooms {
            connections += room.occupant_count().await;
        }
        RegistryStats {
            rooms: rooms.len(),
            connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryStore, StoredDocument};

    async fn registry_with_document(document_id: &str) -> (RoomRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_document(
                document_id,
                StoredDocument {
                    state: Vec::new(),
                    title: "Untitled Document".to_string(),
                },
            )
            .await;
        let registry = RoomRegistry::new(store.clone(), Duration::from_secs(10));
        (registry, store)
    }

    #[tokio::test]
    async fn missing_document_creates_no_room() {
        let store = Arc::new(MemoryStore::new());
        let registry = RoomRegistry::new(store, Duration::from_secs(10));

        let result = registry.get_or_create("ghost").await;
        assert!(matches!(result, Err(RegistryError::NotFound)));
        assert!(registry.get("ghost").is_none());
    }

    #[tokio::test]
    async fn second_lookup_reuses_the_room() {
        let (registry, _store) = registry_with_document("d1").await;

        let (first, created) = registry.get_or_create("d1").await.unwrap();
        assert!(created);
        let (second, created) = registry.get_or_create("d1").await.unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn teardown_saves_once_and_is_idempotent() {
        let (registry, store) = registry_with_document("d1").await;
        let (_room, _) = registry.get_or_create("d1").await.unwrap();

        registry.teardown("d1").await;
        assert!(registry.get("d1").is_none());

        let saved = store.load_document("d1").await.unwrap().unwrap();
        assert!(!saved.state.is_empty(), "final save must have run");

        // Second teardown observes "already gone" and no-ops.
        registry.teardown("d1").await;
    }

    #[tokio::test]
    async fn concurrent_teardowns_race_safely() {
        let (registry, _store) = registry_with_document("d1").await;
        let registry = Arc::new(registry);
        let (_room, _) = registry.get_or_create("d1").await.unwrap();

        let a = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.teardown("d1").await })
        };
        let b = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.teardown("d1").await })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert!(registry.get("d1").is_none());
    }

    #[tokio::test]
    async fn teardown_then_join_loads_fresh() {
        let (registry, _store) = registry_with_document("d1").await;
        let (first, _) = registry.get_or_create("d1").await.unwrap();
        registry.teardown("d1").await;

        let (second, created) = registry.get_or_create("d1").await.unwrap();
        assert!(created);
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
