//! Per-collection sync configuration

use std::time::Duration;

/// Default interval between periodic reconciliation loads.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of remote commit attempts allowed per queued operation.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Tuning for one logical collection.
///
/// `cache_key` must stay stable for the lifetime of the collection it
/// names; reusing a key for different record semantics corrupts the cache.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identifier of the collection in the local store
    pub cache_key: String,
    /// Remote endpoint serving the collection
    pub remote_endpoint: String,
    /// Interval between periodic reconciliation loads
    pub sync_interval: Duration,
    /// Retry budget per queued operation
    pub max_retries: u32,
}

impl SyncConfig {
    pub fn new(cache_key: impl Into<String>, remote_endpoint: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            remote_endpoint: remote_endpoint.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
