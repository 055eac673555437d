use loro::{ExportMode, LoroDoc};

/// Errors surfaced by the CRDT engine. The engine itself is a black box;
/// these only carry its message text for logging.
#[derive(Debug)]
pub enum CrdtError {
    Import(String),
    Export(String),
}

impl std::fmt::Display for CrdtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrdtError::Import(e) => write!(f, "Failed to import update: {}", e),
            CrdtError::Export(e) => write!(f, "Failed to export state: {}", e),
        }
    }
}

impl std::error::Error for CrdtError {}

/// Opaque handle over the CRDT engine.
///
/// The coordinator never interprets document content; it only seeds a handle
/// from stored bytes, merges incoming deltas, and encodes the full state for
/// persistence and new joiners. Merge semantics live entirely in the engine.
pub struct CrdtDoc {
    doc: LoroDoc,
}

impl CrdtDoc {
    /// Create an empty document handle
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// Build a handle seeded with previously persisted state.
    ///
    /// An empty byte slice means the document exists but has never been
    /// saved, so the handle starts empty.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, CrdtError> {
        let doc = Self::new();
        if !bytes.is_empty() {
            doc.apply_update(bytes)?;
        }
        Ok(doc)
    }

    /// Merge an opaque update into the document
    pub fn apply_update(&self, bytes: &[u8]) -> Result<(), CrdtError> {
        self.doc
            .import(bytes)
            .map(|_| ())
            .map_err(|e| CrdtError::Import(e.to_string()))
    }

    /// Encode the full document state as a snapshot byte stream
    pub fn encode_state(&self) -> Result<Vec<u8>, CrdtError> {
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CrdtError::Export(e.to_string()))
    }
}

impl Default for CrdtDoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_text(text: &str) -> CrdtDoc {
        let doc = CrdtDoc::new();
        doc.doc
            .get_text("content")
            .insert(0, text)
            .expect("insert text");
        doc
    }

    #[test]
    fn snapshot_roundtrip_carries_content() {
        let source = doc_with_text("hello");
        let snapshot = source.encode_state().unwrap();

        let restored = CrdtDoc::from_snapshot(&snapshot).unwrap();
        assert_eq!(restored.doc.get_text("content").to_string(), "hello");
    }

    #[test]
    fn empty_snapshot_seeds_empty_handle() {
        let doc = CrdtDoc::from_snapshot(&[]).unwrap();
        let state = doc.encode_state().unwrap();
        assert!(!state.is_empty());
    }

    #[test]
    fn applying_peer_update_merges_edits() {
        let alice = doc_with_text("alice");
        let bob = CrdtDoc::new();

        bob.apply_update(&alice.encode_state().unwrap()).unwrap();
        assert_eq!(bob.doc.get_text("content").to_string(), "alice");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let doc = CrdtDoc::new();
        assert!(doc.apply_update(b"definitely not a delta").is_err());
    }
}
