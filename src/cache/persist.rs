//! Snapshot persistence seam for the cache.
//!
//! The cache mirrors its whole map into a key/value store on mutation;
//! hosts supply whatever backing they have (disk, embedded KV, a
//! platform store). The trait is deliberately synchronous and stringly
//! typed: one JSON snapshot in, one out.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

#[derive(Debug, Error)]
#[error("persistent store failure: {0}")]
pub struct PersistError(pub String);

/// Key/value snapshot storage. Implementations must tolerate repeated
/// saves of the same key and loads of keys never saved.
pub trait PersistentStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, snapshot: &str) -> Result<(), PersistError>;
    fn clear(&self, key: &str);
}

/// Process-local store, mostly useful in tests and as a reference
/// implementation.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self, key: &str) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn save(&self, key: &str, snapshot: &str) -> Result<(), PersistError> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), snapshot.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
