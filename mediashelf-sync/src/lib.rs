//! Local-first synchronization engine for MediaShelf
//!
//! Keeps client-held caches of user-scoped records (watch history,
//! watchlist, favorites, ratings, content and plan records) consistent
//! with the authoritative remote store while tolerating intermittent
//! connectivity, without blocking callers on network round-trips.
//!
//! Provides:
//! - Remote-preferred reads with cache fallback
//! - Optimistic local writes with deferred remote commit
//! - A persisted retry queue with bounded retry budgets
//! - Periodic reconciliation and connectivity-driven queue flushing
//!
//! Conflict resolution between writers is out of scope: reconciliation is
//! last-writer-wins by contract.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod local_store;
pub mod manager;
pub mod queue;
pub mod remote;

pub use cache::CacheStore;
pub use config::{SyncConfig, DEFAULT_MAX_RETRIES, DEFAULT_SYNC_INTERVAL};
pub use connectivity::{ConnectivityMonitor, SubscriptionId};
pub use error::{SyncError, SyncResult};
pub use local_store::{FileStore, LocalStore, MemoryStore};
pub use manager::{SyncManager, SyncStats};
pub use queue::{OperationKind, OperationQueue, SyncOperation};
pub use remote::{Envelope, HttpRemoteStore, RemoteStore};
