//! Domain-record cache and last-sync bookkeeping
//!
//! Provides:
//! - Per-collection record cache, keyed by the caller's cache key
//! - Full-replace writes only (the engine always holds the complete
//!   authoritative-or-optimistic collection when it writes)
//! - Last-sync timestamps for staleness queries

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::SyncResult;
use crate::local_store::LocalStore;

const LAST_SYNC_KEY: &str = "sync.last_sync";

/// Cache layer over the local store.
pub struct CacheStore {
    store: Arc<dyn LocalStore>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Returns the cached records for `cache_key`.
    ///
    /// Absent or corrupt entries read as empty; a damaged cache is a
    /// degraded state, never a fatal one.
    pub fn read_cache(&self, cache_key: &str) -> Vec<Value> {
        let Some(bytes) = self.store.get(cache_key) else {
            return Vec::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                tracing::debug!(
                    cache_key = cache_key,
                    error = %e,
                    "Corrupt cache entry, reading as empty"
                );
                Vec::new()
            }
        }
    }

    /// Replaces the whole collection stored under `cache_key`.
    pub fn write_cache(&self, cache_key: &str, records: &[Value]) -> SyncResult<()> {
        let bytes = serde_json::to_vec(records)?;
        self.store.set(cache_key, &bytes)
    }

    /// Records the timestamp of the last successful remote load for a key.
    ///
    /// Timestamps feed staleness queries only; a failed write here is
    /// logged and swallowed rather than surfaced.
    pub fn record_last_sync(&self, cache_key: &str, at: DateTime<Utc>) {
        let mut map = self.last_sync_map();
        map.insert(cache_key.to_string(), at);
        let bytes = match serde_json::to_vec(&map) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(cache_key = cache_key, error = %e, "Failed to serialize last-sync map");
                return;
            }
        };
        if let Err(e) = self.store.set(LAST_SYNC_KEY, &bytes) {
            tracing::warn!(cache_key = cache_key, error = %e, "Failed to persist last-sync map");
        }
    }

    /// Returns when `cache_key` last completed a successful remote load.
    pub fn last_sync(&self, cache_key: &str) -> Option<DateTime<Utc>> {
        self.last_sync_map().get(cache_key).copied()
    }

    fn last_sync_map(&self) -> HashMap<String, DateTime<Utc>> {
        self.store
            .get(LAST_SYNC_KEY)
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }
}
