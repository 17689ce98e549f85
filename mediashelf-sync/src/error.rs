//! Error types for the sync engine

use thiserror::Error;

/// Failures the engine can observe.
///
/// `RemoteUnavailable` and `RemoteRejected` are recovered locally by
/// requeueing with a bounded retry budget; they never cross the engine's
/// public read/write surface. `LocalStore` is the one condition a `save`
/// caller must treat as "your change was not durably accepted".
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store unreachable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote store rejected request: {0}")]
    RemoteRejected(String),

    #[error("Local store failure: {0}")]
    LocalStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
