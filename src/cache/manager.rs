//! Bounded TTL + LRU cache for load results.
//!
//! Keys are source URLs; values are small accounting records (byte
//! size, MIME type, observed load time, access stats), not payload
//! bytes. Expiry is lazy on read plus a sweep on every write; when the
//! map outgrows its entry or byte budget the least recently accessed
//! entries go first. One engine instance owns one cache map.

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::persist::PersistentStore;

const SNAPSHOT_KEY: &str = "haven-content-cache";

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Byte budget across all entries.
    pub max_size: u64,
    /// Entry-count budget.
    pub max_entries: usize,
    /// Entries older than this are expired.
    pub ttl: Duration,
    /// Mirror the map into a [`PersistentStore`] on mutation.
    pub persistent: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 50 * 1024 * 1024,
            max_entries: 100,
            ttl: Duration::from_secs(24 * 60 * 60),
            persistent: false,
        }
    }
}

impl CacheConfig {
    /// Reads overrides from `HAVEN_CACHE_*` variables, falling back to
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env::var("HAVEN_CACHE_MAX_SIZE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_size),
            max_entries: env::var("HAVEN_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_entries),
            ttl: env::var("HAVEN_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            persistent: env::var("HAVEN_CACHE_PERSISTENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.persistent),
        }
    }
}

/// Accounting record for one cached URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<u64>,
    pub access_count: u64,
    pub last_accessed_ms: u64,
}

/// Fields a writer may contribute; everything else (timestamps, access
/// counters) is managed by the cache itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub load_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    /// Entries divided by total recorded accesses; a crude measure of
    /// how often reads land on already-known URLs.
    pub hit_rate: f64,
    pub average_load_time_ms: f64,
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    entries: Vec<(String, CacheEntry)>,
    total_size: u64,
}

/// See the module docs. All methods take `&self`; the map and byte
/// counter use their own synchronization.
pub struct CacheManager {
    entries: DashMap<String, CacheEntry>,
    total_size: AtomicU64,
    config: CacheConfig,
    store: Option<Arc<dyn PersistentStore>>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            total_size: AtomicU64::new(0),
            config,
            store: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Attaches a persistence backend and, when `config.persistent` is
    /// set, restores the previous snapshot.
    pub fn with_store(config: CacheConfig, store: Arc<dyn PersistentStore>) -> Self {
        let manager = Self {
            entries: DashMap::new(),
            total_size: AtomicU64::new(0),
            config,
            store: Some(store),
        };
        if manager.config.persistent {
            manager.restore_snapshot();
        }
        manager
    }

    fn persistence_enabled(&self) -> bool {
        self.config.persistent && self.store.is_some()
    }

    /// Records or refreshes an entry, then unconditionally runs the
    /// cleanup pass. Merging bumps the access stats and overwrites only
    /// the fields present in the patch.
    pub fn set(&self, key: &str, patch: EntryPatch) {
        let now = now_millis();
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.access_count += 1;
                entry.last_accessed_ms = now;
                if let Some(size) = patch.size {
                    let old = entry.size.unwrap_or(0);
                    if size >= old {
                        self.total_size.fetch_add(size - old, Ordering::Relaxed);
                    } else {
                        self.total_size.fetch_sub(old - size, Ordering::Relaxed);
                    }
                    entry.size = Some(size);
                }
                if patch.mime_type.is_some() {
                    entry.mime_type = patch.mime_type;
                }
                if patch.load_time_ms.is_some() {
                    entry.load_time_ms = patch.load_time_ms;
                }
            }
            None => {
                if let Some(size) = patch.size {
                    self.total_size.fetch_add(size, Ordering::Relaxed);
                }
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        key: key.to_string(),
                        timestamp_ms: now,
                        size: patch.size,
                        mime_type: patch.mime_type,
                        load_time_ms: patch.load_time_ms,
                        access_count: 1,
                        last_accessed_ms: now,
                    },
                );
            }
        }

        self.cleanup();
        self.persist_snapshot();
    }

    /// Returns a live entry and counts the access. Expired entries are
    /// deleted on the spot and reported as absent.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let expired = {
            let entry = self.entries.get(key)?;
            now_millis().saturating_sub(entry.timestamp_ms) > self.config.ttl.as_millis() as u64
        };
        if expired {
            self.remove_entry(key);
            return None;
        }
        let mut entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed_ms = now_millis();
        Some(entry.clone())
    }

    /// True when a live entry exists. Counts as an access.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes an entry; returns whether one existed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.remove_entry(key);
        if removed {
            self.persist_snapshot();
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.total_size.store(0, Ordering::Relaxed);
        if self.persistence_enabled() {
            if let Some(store) = &self.store {
                store.clear(SNAPSHOT_KEY);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut total_accesses = 0u64;
        let mut total_load_time = 0u64;
        let entries = self.entries.len();
        for entry in self.entries.iter() {
            total_accesses += entry.access_count;
            total_load_time += entry.load_time_ms.unwrap_or(0);
        }
        CacheStats {
            entries,
            total_size: self.total_size.load(Ordering::Relaxed),
            hit_rate: if total_accesses > 0 {
                entries as f64 / total_accesses as f64
            } else {
                0.0
            },
            average_load_time_ms: if entries > 0 {
                total_load_time as f64 / entries as f64
            } else {
                0.0
            },
        }
    }

    // Removes without persisting; internal helper shared by delete,
    // lazy expiry and the cleanup sweep.
    fn remove_entry(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                if let Some(size) = entry.size {
                    self.total_size.fetch_sub(size, Ordering::Relaxed);
                }
                true
            }
            None => false,
        }
    }

    // One pass: sweep expired entries, then evict by LRU if either
    // budget is still exceeded. The evict count couples both budgets:
    // max(over-count, byte-pressure ? ceil(20% of entries) : 0).
    fn cleanup(&self) {
        let now = now_millis();
        let ttl_ms = self.config.ttl.as_millis() as u64;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| now.saturating_sub(entry.timestamp_ms) > ttl_ms)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }

        let len = self.entries.len();
        let over_bytes = self.total_size.load(Ordering::Relaxed) > self.config.max_size;
        if len > self.config.max_entries || over_bytes {
            let mut by_recency: Vec<(String, u64)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.last_accessed_ms))
                .collect();
            by_recency.sort_by_key(|(_, last)| *last);

            let to_remove = usize::max(
                len.saturating_sub(self.config.max_entries),
                if over_bytes { len.div_ceil(5) } else { 0 },
            );
            for (key, _) in by_recency.iter().take(to_remove) {
                self.remove_entry(key);
            }
            if to_remove > 0 {
                debug!(
                    evicted = to_remove,
                    expired = expired.len(),
                    remaining = self.entries.len(),
                    "cache cleanup"
                );
            }
        }
    }

    fn persist_snapshot(&self) {
        if !self.persistence_enabled() {
            return;
        }
        let Some(store) = &self.store else { return };
        let snapshot = CacheSnapshot {
            entries: self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.clone()))
                .collect(),
            total_size: self.total_size.load(Ordering::Relaxed),
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(err) = store.save(SNAPSHOT_KEY, &json) {
                    warn!(%err, "failed to save cache snapshot");
                }
            }
            Err(err) => warn!(%err, "failed to serialize cache snapshot"),
        }
    }

    fn restore_snapshot(&self) {
        let Some(store) = &self.store else { return };
        let Some(json) = store.load(SNAPSHOT_KEY) else {
            return;
        };
        match serde_json::from_str::<CacheSnapshot>(&json) {
            Ok(snapshot) => {
                for (key, entry) in snapshot.entries {
                    self.entries.insert(key, entry);
                }
                self.total_size.store(snapshot.total_size, Ordering::Relaxed);
                debug!(entries = self.entries.len(), "restored cache snapshot");
            }
            Err(err) => warn!(%err, "ignoring corrupt cache snapshot"),
        }
    }
}
