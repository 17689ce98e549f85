//! Persisted operation queue
//!
//! A single FIFO of not-yet-committed mutations, shared across all cache
//! keys. The persisted queue is the only durable record of uncommitted
//! writes; losing it drops pending mutations (degraded-mode loss, not a
//! crash).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DEFAULT_MAX_RETRIES;
use crate::error::SyncResult;
use crate::local_store::LocalStore;

const QUEUE_KEY: &str = "sync.pending_operations";

fn default_retry_budget() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Mutation kind carried by a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// A mutation awaiting successful remote commit.
///
/// `retry_count` only increases; the operation leaves the queue once it
/// commits or once its retry budget is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique operation ID
    pub id: String,
    /// Operation kind
    pub kind: OperationKind,
    /// Target remote path
    pub endpoint: String,
    /// Opaque JSON body
    pub payload: Value,
    /// When the operation was created
    pub created_at: DateTime<Utc>,
    /// Number of failed commit attempts so far
    pub retry_count: u32,
    /// Retry budget captured from the originating config; queues
    /// persisted before the field existed read back the default
    #[serde(default = "default_retry_budget")]
    pub max_retries: u32,
    /// Last failure message (if any)
    pub last_error: Option<String>,
}

impl SyncOperation {
    pub fn new(kind: OperationKind, endpoint: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        let suffix: u32 = rand::random();
        Self {
            id: format!("{}-{:08x}", now.timestamp_millis(), suffix),
            kind,
            endpoint: endpoint.into(),
            payload,
            created_at: now,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_error: None,
        }
    }

    /// Renders the payload's top-level fields as query parameters.
    ///
    /// Delete commits carry no body; their payload travels in the query
    /// string instead. Non-string scalars are rendered as JSON text.
    pub fn query_params(&self) -> Vec<(String, String)> {
        match self.payload.as_object() {
            Some(fields) => fields
                .iter()
                .map(|(key, value)| {
                    let rendered = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), rendered)
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Persisted FIFO of pending operations.
pub struct OperationQueue {
    store: Arc<dyn LocalStore>,
}

impl OperationQueue {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Reads the current queue; absent or corrupt reads as empty.
    pub fn load(&self) -> Vec<SyncOperation> {
        let Some(bytes) = self.store.get(QUEUE_KEY) else {
            return Vec::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(operations) => operations,
            Err(e) => {
                tracing::debug!(error = %e, "Corrupt operation queue, reading as empty");
                Vec::new()
            }
        }
    }

    /// Replaces the persisted queue in one write.
    pub fn replace(&self, operations: &[SyncOperation]) -> SyncResult<()> {
        if operations.is_empty() {
            return self.store.remove(QUEUE_KEY);
        }
        let bytes = serde_json::to_vec(operations)?;
        self.store.set(QUEUE_KEY, &bytes)
    }

    /// Appends one operation to the persisted queue.
    pub fn push(&self, operation: SyncOperation) -> SyncResult<()> {
        let mut operations = self.load();
        tracing::debug!(
            operation_id = %operation.id,
            kind = operation.kind.as_str(),
            retry_count = operation.retry_count,
            "Queued operation"
        );
        operations.push(operation);
        self.replace(&operations)
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::MemoryStore;
    use serde_json::json;

    fn test_queue() -> (OperationQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (OperationQueue::new(store.clone()), store)
    }

    #[test]
    fn test_new_operation_starts_fresh() {
        let op = SyncOperation::new(
            OperationKind::Create,
            "/users/u1/watchlist",
            json!({"contentId": "m1"}),
        );
        assert_eq!(op.retry_count, 0);
        assert_eq!(op.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(op.last_error, None);
        assert!(op.id.contains('-'));
    }

    #[test]
    fn test_operation_without_budget_field_reads_default() {
        // queues persisted before the budget travelled with the
        // operation must still deserialize
        let json = r#"{
            "id": "1756600000000-00c0ffee",
            "kind": "create",
            "endpoint": "/users/u1/watchlist",
            "payload": {"contentId": "m1"},
            "created_at": "2026-08-31T00:00:00Z",
            "retry_count": 2,
            "last_error": null
        }"#;

        let op: SyncOperation = serde_json::from_str(json).unwrap();
        assert_eq!(op.retry_count, 2);
        assert_eq!(op.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_operation_ids_are_unique() {
        let a = SyncOperation::new(OperationKind::Create, "/x", json!({}));
        let b = SyncOperation::new(OperationKind::Create, "/x", json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_push_preserves_fifo_order() {
        let (queue, _) = test_queue();
        for content_id in ["m1", "m2", "m3"] {
            queue
                .push(SyncOperation::new(
                    OperationKind::Create,
                    "/users/u1/watchlist",
                    json!({"contentId": content_id}),
                ))
                .unwrap();
        }

        let pending = queue.load();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].payload["contentId"], "m1");
        assert_eq!(pending[2].payload["contentId"], "m3");
    }

    #[test]
    fn test_replace_with_empty_clears_storage() {
        let (queue, store) = test_queue();
        queue
            .push(SyncOperation::new(OperationKind::Delete, "/x", json!({"id": "m1"})))
            .unwrap();
        assert!(store.get(QUEUE_KEY).is_some());

        queue.replace(&[]).unwrap();
        assert!(store.get(QUEUE_KEY).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_corrupt_queue_reads_as_empty() {
        let (queue, store) = test_queue();
        store.set(QUEUE_KEY, b"{{{").unwrap();
        assert!(queue.load().is_empty());
    }

    #[test]
    fn test_queue_survives_across_handles() {
        let store = Arc::new(MemoryStore::new());
        OperationQueue::new(store.clone())
            .push(SyncOperation::new(OperationKind::Update, "/x", json!({"a": 1})))
            .unwrap();

        let reopened = OperationQueue::new(store);
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_query_params_from_payload() {
        let op = SyncOperation::new(
            OperationKind::Delete,
            "/users/u1/watchlist",
            json!({"contentId": "m1", "position": 7}),
        );

        let mut params = op.query_params();
        params.sort();
        assert_eq!(
            params,
            vec![
                ("contentId".to_string(), "m1".to_string()),
                ("position".to_string(), "7".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_params_non_object_payload() {
        let op = SyncOperation::new(OperationKind::Delete, "/x", json!(["m1"]));
        assert!(op.query_params().is_empty());
    }
}
