//! Synchronous key-value persistence
//!
//! The engine keeps three structures in the local store: the per-collection
//! record cache, the pending-operation queue, and the last-sync map. Every
//! write serializes the full structure being updated; there are no partial
//! writes and no transactions.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::{SyncError, SyncResult};

/// Process-local byte store surviving restarts.
///
/// Synchronous by contract: engine code never suspends on local persistence.
pub trait LocalStore: Send + Sync {
    /// Returns the stored bytes for `key`, or `None` if absent.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Replaces the value under `key`.
    fn set(&self, key: &str, value: &[u8]) -> SyncResult<()>;

    /// Removes `key`; absent keys are not an error.
    fn remove(&self, key: &str) -> SyncResult<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// On-disk store keeping one file per key under a directory.
///
/// Values are replaced whole via write-to-temp-then-rename, so readers never
/// observe a torn write.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SyncError::LocalStore(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Cache keys may carry characters that are unsafe in file names.
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(safe)
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &[u8]) -> SyncResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("part");
        fs::write(&tmp, value).map_err(|e| SyncError::LocalStore(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| SyncError::LocalStore(e.to_string()))
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::LocalStore(e.to_string())),
        }
    }
}
