//! Load-result caching.
//!
//! A bounded TTL + LRU map of per-URL accounting records, with an
//! optional snapshot mirror into a host-supplied persistent store.

pub mod manager;
pub mod persist;

pub use manager::{CacheConfig, CacheEntry, CacheManager, CacheStats, EntryPatch};
pub use persist::{MemoryStore, PersistError, PersistentStore};
