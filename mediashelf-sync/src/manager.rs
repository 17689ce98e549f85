//! Sync orchestrator
//!
//! Provides:
//! - Remote-preferred reads with cache fallback (`load` is total)
//! - Optimistic local writes with deferred remote commit (`save`)
//! - Persisted retry queue draining (`process_queue`)
//! - Periodic reconciliation per cache key and staleness queries
//!
//! One `SyncManager` is constructed per process and handed around by
//! clone; every clone shares the same cache, queue, and timer table, so
//! there are no hidden singletons.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, SubscriptionId};
use crate::error::SyncResult;
use crate::local_store::LocalStore;
use crate::queue::{OperationKind, OperationQueue, SyncOperation};
use crate::remote::RemoteStore;

/// Outcome counts of one `process_queue` pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Operations committed remotely and removed from the queue
    pub committed: usize,
    /// Operations requeued with an incremented retry count
    pub retrying: usize,
    /// Operations dropped after exhausting their retry budget
    pub dropped: usize,
}

struct ManagerInner {
    cache: CacheStore,
    queue: OperationQueue,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    flush_subscription: Mutex<Option<SubscriptionId>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(id) = self.flush_subscription.lock().take() {
            self.connectivity.unsubscribe(id);
        }
    }
}

/// The sync engine proper.
///
/// Reads prefer the remote store and fall back to cache; writes prefer the
/// cache and push to the remote store in the background, falling back to
/// the persisted queue on failure or while offline. The queue is flushed
/// automatically when connectivity returns.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<ManagerInner>,
}

impl SyncManager {
    /// Builds the manager and wires the offline-to-online transition to an
    /// unawaited queue flush.
    ///
    /// The flush listener holds only a weak handle to the engine state and
    /// is unsubscribed when the last manager clone is dropped, so the
    /// monitor never keeps a dropped engine alive.
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let manager = Self {
            inner: Arc::new(ManagerInner {
                cache: CacheStore::new(store.clone()),
                queue: OperationQueue::new(store),
                remote,
                connectivity: connectivity.clone(),
                timers: Mutex::new(HashMap::new()),
                flush_subscription: Mutex::new(None),
            }),
        };

        let flusher: Weak<ManagerInner> = Arc::downgrade(&manager.inner);
        let subscription = connectivity.subscribe(move |online| {
            if !online {
                return;
            }
            let Some(inner) = flusher.upgrade() else {
                return;
            };
            let manager = SyncManager { inner };
            tokio::spawn(async move {
                tracing::info!("Connectivity restored, flushing pending operations");
                manager.process_queue().await;
            });
        });
        *manager.inner.flush_subscription.lock() = Some(subscription);

        manager
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Loads the collection named by `config`.
    ///
    /// Remote-preferred: a successful fetch replaces the cache with the
    /// remote snapshot and records the sync timestamp. Any failure falls
    /// back to the cached records, so this never errors — the result may
    /// be empty or stale. Note the replacement can race with a queued
    /// operation that has not committed yet: the remote snapshot wins
    /// until the queue flush catches up (last-writer-wins, by contract).
    pub async fn load<T: DeserializeOwned>(&self, config: &SyncConfig) -> Vec<T> {
        match self.fetch_and_cache(config).await {
            Ok(records) => decode_records(records),
            Err(e) => {
                tracing::warn!(
                    cache_key = %config.cache_key,
                    endpoint = %config.remote_endpoint,
                    error = %e,
                    "Remote load failed, serving cached records"
                );
                decode_records(self.inner.cache.read_cache(&config.cache_key))
            }
        }
    }

    async fn fetch_and_cache(&self, config: &SyncConfig) -> SyncResult<Vec<Value>> {
        let envelope = self.inner.remote.fetch(&config.remote_endpoint).await?;
        let records = normalize_collection(envelope.into_data()?);
        self.inner.cache.write_cache(&config.cache_key, &records)?;
        self.inner.cache.record_last_sync(&config.cache_key, Utc::now());
        tracing::debug!(
            cache_key = %config.cache_key,
            records = records.len(),
            "Cache refreshed from remote"
        );
        Ok(records)
    }

    /// Writes `records` through the cache and commits `operation` remotely
    /// in the background.
    ///
    /// The local write is unconditional and immediate; the caller is never
    /// blocked on the network. Returns `false` only when the local cache
    /// write itself fails — a remote failure is absorbed because the
    /// operation is already held durably in the queue. Passing no
    /// operation requests a full reconciliation `load` instead.
    pub async fn save<T: Serialize>(
        &self,
        config: &SyncConfig,
        records: &[T],
        operation: Option<SyncOperation>,
    ) -> bool {
        let values = match records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
        {
            Ok(values) => values,
            Err(e) => {
                tracing::error!(
                    cache_key = %config.cache_key,
                    error = %e,
                    "Failed to serialize collection, change not accepted"
                );
                return false;
            }
        };
        if let Err(e) = self.inner.cache.write_cache(&config.cache_key, &values) {
            tracing::error!(
                cache_key = %config.cache_key,
                error = %e,
                "Local cache write failed, change not accepted"
            );
            return false;
        }

        match operation {
            Some(operation) if self.inner.connectivity.is_online() => {
                if let Err(e) = self.sync_operation(operation, config).await {
                    tracing::debug!(
                        cache_key = %config.cache_key,
                        error = %e,
                        "Background commit failed, operation held for retry"
                    );
                }
            }
            Some(mut operation) => {
                operation.max_retries = config.max_retries;
                tracing::debug!(
                    cache_key = %config.cache_key,
                    operation_id = %operation.id,
                    "Offline, operation queued"
                );
                if let Err(e) = self.inner.queue.push(operation) {
                    tracing::error!(cache_key = %config.cache_key, error = %e, "Failed to enqueue operation");
                }
            }
            None => {
                // Caller tracks no per-mutation delta; pull authoritative state.
                let _: Vec<Value> = self.load(config).await;
            }
        }
        true
    }

    /// Builds a pending operation for the write path.
    pub fn create_operation(
        &self,
        kind: OperationKind,
        endpoint: impl Into<String>,
        payload: Value,
    ) -> SyncOperation {
        SyncOperation::new(kind, endpoint, payload)
    }

    /// Attempts one remote commit of `operation`.
    ///
    /// The config's retry budget is stamped onto the operation, so later
    /// queue passes judge exhaustion against the same number. On failure
    /// within that budget the operation is appended to the persisted queue
    /// with an incremented retry count and the error is returned, so the
    /// caller knows it did not commit. Once the budget is exhausted the
    /// operation is dropped and logged — availability over strict
    /// durability, the documented data-loss boundary.
    pub async fn sync_operation(
        &self,
        mut operation: SyncOperation,
        config: &SyncConfig,
    ) -> SyncResult<()> {
        operation.max_retries = config.max_retries;
        match self.attempt_commit(&operation).await {
            Ok(()) => {
                tracing::debug!(
                    operation_id = %operation.id,
                    kind = operation.kind.as_str(),
                    "Operation committed"
                );
                Ok(())
            }
            Err(e) if operation.retry_count < operation.max_retries => {
                operation.retry_count += 1;
                operation.last_error = Some(e.to_string());
                tracing::warn!(
                    operation_id = %operation.id,
                    retry_count = operation.retry_count,
                    error = %e,
                    "Remote commit failed, requeueing"
                );
                if let Err(persist) = self.inner.queue.push(operation) {
                    tracing::error!(error = %persist, "Failed to persist requeued operation");
                }
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    operation_id = %operation.id,
                    kind = operation.kind.as_str(),
                    retry_count = operation.retry_count,
                    error = %e,
                    "Retry budget exhausted, dropping operation"
                );
                Ok(())
            }
        }
    }

    async fn attempt_commit(&self, operation: &SyncOperation) -> SyncResult<()> {
        let envelope = match operation.kind {
            OperationKind::Create | OperationKind::Update => {
                self.inner
                    .remote
                    .send(&operation.endpoint, &operation.payload)
                    .await?
            }
            OperationKind::Delete => {
                self.inner
                    .remote
                    .delete(&operation.endpoint, &operation.query_params())
                    .await?
            }
        };
        envelope.into_data().map(|_| ())
    }

    /// Drains the persisted queue once, in FIFO order.
    ///
    /// No-op while offline. The queue is read once at the start and written
    /// back exactly once at the end, so a crash mid-drain loses at most
    /// this pass. Failed attempts are independent; a later operation is
    /// not blocked on an earlier one's retry.
    pub async fn process_queue(&self) -> SyncStats {
        let mut stats = SyncStats::default();
        if !self.inner.connectivity.is_online() {
            return stats;
        }
        let pending = self.inner.queue.load();
        if pending.is_empty() {
            return stats;
        }

        tracing::info!(pending = pending.len(), "Draining operation queue");
        let mut retained = Vec::new();
        for mut operation in pending {
            match self.attempt_commit(&operation).await {
                Ok(()) => {
                    tracing::debug!(operation_id = %operation.id, "Queued operation committed");
                    stats.committed += 1;
                }
                Err(e) if operation.retry_count < operation.max_retries => {
                    operation.retry_count += 1;
                    operation.last_error = Some(e.to_string());
                    stats.retrying += 1;
                    retained.push(operation);
                }
                Err(e) => {
                    tracing::error!(
                        operation_id = %operation.id,
                        retry_count = operation.retry_count,
                        error = %e,
                        "Retry budget exhausted, dropping operation"
                    );
                    stats.dropped += 1;
                }
            }
        }
        if let Err(e) = self.inner.queue.replace(&retained) {
            tracing::error!(error = %e, "Failed to write back operation queue");
        }
        tracing::info!(
            committed = stats.committed,
            retrying = stats.retrying,
            dropped = stats.dropped,
            "Queue pass complete"
        );
        stats
    }

    /// Starts (or restarts) periodic reconciliation for `config.cache_key`.
    ///
    /// Any existing timer for the key is cancelled first, so restarting is
    /// idempotent and never leaks timers. Ticks while offline are skipped
    /// outright — reconciliation is a pure read, there is nothing to queue.
    pub fn start_periodic_sync(&self, config: &SyncConfig) {
        let mut timers = self.inner.timers.lock();
        if let Some(previous) = timers.remove(&config.cache_key) {
            previous.abort();
        }

        let manager = self.clone();
        let config = config.clone();
        let cache_key = config.cache_key.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.sync_interval);
            // interval fires immediately; the first reconciliation should
            // happen one full interval after start
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !manager.inner.connectivity.is_online() {
                    tracing::debug!(
                        cache_key = %config.cache_key,
                        "Offline, skipping periodic reconciliation"
                    );
                    continue;
                }
                let _: Vec<Value> = manager.load(&config).await;
            }
        });
        tracing::debug!(cache_key = %cache_key, "Periodic sync started");
        timers.insert(cache_key, handle);
    }

    /// Cancels periodic reconciliation for `cache_key`.
    pub fn stop_periodic_sync(&self, cache_key: &str) {
        if let Some(handle) = self.inner.timers.lock().remove(cache_key) {
            handle.abort();
            tracing::debug!(cache_key = cache_key, "Periodic sync stopped");
        }
    }

    /// Cache keys with an active periodic reconciliation timer.
    pub fn active_periodic_syncs(&self) -> Vec<String> {
        self.inner.timers.lock().keys().cloned().collect()
    }

    /// Whether `cache_key` completed a successful remote load within
    /// `max_age`. Purely a staleness query; never gates correctness.
    pub fn is_synced(&self, cache_key: &str, max_age: Duration) -> bool {
        match self.inner.cache.last_sync(cache_key) {
            Some(at) => {
                let age_ms = Utc::now().signed_duration_since(at).num_milliseconds();
                let max_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
                age_ms <= max_ms
            }
            None => false,
        }
    }

    /// Explicit user-triggered refresh: `load` followed unconditionally by
    /// a queue pass, regardless of periodic-timer state.
    pub async fn force_sync<T: DeserializeOwned>(&self, config: &SyncConfig) -> Vec<T> {
        let records = self.load(config).await;
        self.process_queue().await;
        records
    }

    /// Snapshot of the pending operations, oldest first.
    pub fn pending_operations(&self) -> Vec<SyncOperation> {
        self.inner.queue.load()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.queue.is_empty()
    }
}

/// The remote envelope may carry a bare object where the engine expects a
/// collection; wrap it rather than reject it.
fn normalize_collection(data: Value) -> Vec<Value> {
    match data {
        Value::Array(records) => records,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn decode_records<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping record with unexpected shape");
                None
            }
        })
        .collect()
}
