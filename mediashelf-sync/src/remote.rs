//! Remote store client and response envelope
//!
//! The remote store is an external collaborator reachable only through a
//! JSON-over-HTTP contract: every endpoint speaks the
//! `{ success, data?, error? }` envelope. The transport sits behind the
//! [`RemoteStore`] trait so tests can substitute a scripted double.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};

/// JSON envelope every remote endpoint returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Unwraps the payload, mapping `success: false` to `RemoteRejected`.
    pub fn into_data(self) -> SyncResult<Value> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(SyncError::RemoteRejected(
                self.error
                    .unwrap_or_else(|| "remote reported failure".to_string()),
            ))
        }
    }
}

/// Transport seam to the authoritative remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the collection at `endpoint`.
    async fn fetch(&self, endpoint: &str) -> SyncResult<Envelope>;

    /// Sends a body-bearing commit (create/update) to `endpoint`.
    async fn send(&self, endpoint: &str, body: &Value) -> SyncResult<Envelope>;

    /// Sends a delete commit with the payload rendered as query parameters.
    async fn delete(&self, endpoint: &str, query: &[(String, String)]) -> SyncResult<Envelope>;
}

/// reqwest-backed remote store client.
///
/// The engine imposes no deadline of its own; the 30 s client timeout is
/// the only bound on an individual call.
pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn read_envelope(response: reqwest::Response) -> SyncResult<Envelope> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteRejected(format!("HTTP {status}: {body}")));
        }
        response
            .json::<Envelope>()
            .await
            .map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, endpoint: &str) -> SyncResult<Envelope> {
        let response = self
            .client
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Self::read_envelope(response).await
    }

    async fn send(&self, endpoint: &str, body: &Value) -> SyncResult<Envelope> {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Self::read_envelope(response).await
    }

    async fn delete(&self, endpoint: &str, query: &[(String, String)]) -> SyncResult<Envelope> {
        let response = self
            .client
            .delete(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Self::read_envelope(response).await
    }
}
