//! # HTTP Blob Store Client
//!
//! Talks to any server exposing the CredVault blob interface, including
//! `credvault-node` itself:
//!
//! | Request                 | Success                     | Failure            |
//! |-------------------------|-----------------------------|--------------------|
//! | `POST /blobs` raw body  | `201 {"hash": "Qm..."}`     | 4xx, 5xx           |
//! | `GET /blobs/{hash}`     | `200` raw bytes             | `404`, 4xx, 5xx    |
//!
//! ## Error Mapping
//!
//! - connection failure, timeout, 5xx → [`StoreError::StoreUnavailable`]
//! - 404 on fetch → [`StoreError::NotFound`]
//! - any other non-success reply (400, 413, ...) → [`StoreError::Rejected`],
//!   which is never retried
//! - server hash ≠ locally computed hash, or fetched bytes that don't hash
//!   to the request → [`StoreError::Corrupted`]
//!
//! Retries are not built in. The issuance orchestrator owns retry policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::cas::{verify_fetched, ContentHash, ContentStore, StoreError};
use crate::config::DEFAULT_STORE_REQUEST_TIMEOUT;

/// Configuration for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL, e.g. `http://127.0.0.1:9841`. A trailing slash is ignored.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9841".to_string(),
            timeout: DEFAULT_STORE_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    hash: String,
}

/// reqwest-backed [`ContentStore`].
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::StoreUnavailable(format!("failed to build HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request, mapping transport failures and 5xx uniformly.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::StoreUnavailable(format!("{operation}: timed out"))
            } else {
                StoreError::StoreUnavailable(format!("{operation}: {e}"))
            }
        })?;

        if resp.status().is_server_error() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::StoreUnavailable(format!(
                "{operation}: HTTP {status}: {body}"
            )));
        }

        Ok(resp)
    }
}

/// A non-success reply the server meant: the request itself was refused.
async fn rejected(resp: reqwest::Response, operation: &str) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    StoreError::Rejected {
        operation: operation.to_string(),
        status,
        body,
    }
}

#[async_trait]
impl ContentStore for HttpStore {
    async fn publish(&self, bytes: &[u8]) -> Result<ContentHash, StoreError> {
        let expected = ContentHash::of(bytes);
        let url = format!("{}/blobs", self.base_url);

        let resp = self
            .send(
                self.client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.to_vec()),
                "publish",
            )
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp, "publish").await);
        }

        let body: PublishResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("publish: bad response body: {e}")))?;

        if body.hash != expected.to_string() {
            return Err(StoreError::Corrupted {
                expected,
                actual: body.hash,
            });
        }

        tracing::debug!(hash = %expected, size = bytes.len(), url = %url, "published blob");
        Ok(expected)
    }

    async fn fetch(&self, hash: &ContentHash) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/blobs/{}", self.base_url, hash);
        let resp = self.send(self.client.get(&url), "fetch").await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(*hash));
        }
        if !status.is_success() {
            return Err(rejected(resp, "fetch").await);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("fetch: reading body: {e}")))?;

        tracing::debug!(%hash, size = bytes.len(), "fetched blob");
        verify_fetched(hash, bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_trimmed() {
        let store = HttpStore::new(HttpStoreConfig::new("http://localhost:1234/")).unwrap();
        assert_eq!(store.base_url(), "http://localhost:1234");
    }

    #[tokio::test]
    async fn closed_port_is_unavailable() {
        let store = HttpStore::new(HttpStoreConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        let err = store.publish(b"x").await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }
}
