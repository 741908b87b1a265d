//! # Issuance Orchestrator
//!
//! Ties the confidential storage pipeline to the registry.
//!
//! ```text
//! issue:    document --seal(holder pk)--> record --publish--> hash --issue_credential--> id
//! retrieve: id --get_credential--> hash --fetch--> record --open(holder sk)--> document
//! ```
//!
//! Ordering matters on the way in: the ledger is written last, so a failure
//! while sealing or publishing leaves the registry untouched. A failure in
//! the ledger step after a successful publish leaves an orphaned blob,
//! which nobody references and nobody can read but the holder.
//!
//! No registry lock is held while the store is being talked to.
//!
//! ## Retries
//!
//! Store calls that fail with [`StoreError::StoreUnavailable`] are retried
//! with exponential backoff: `base_delay`, `2 * base_delay`,
//! `4 * base_delay`, ... up to `max_retries` extra attempts. Everything else
//! surfaces on the first failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use credvault_protocol::config::{DEFAULT_STORE_MAX_RETRIES, DEFAULT_STORE_RETRY_BASE_DELAY};
use credvault_protocol::crypto::keys::{EncryptionKeypair, EncryptionPublicKey};
use credvault_protocol::crypto::sealed::{self, EncryptedRecord, SealedError};
use credvault_protocol::identity::Address;
use credvault_protocol::storage::{ContentStore, StoreError};
use thiserror::Error;

use crate::registry::{RegistryError, SharedRegistry};

/// Errors from the issuance pipeline, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// Sealing the document to the holder's key failed.
    #[error("encryption stage: {0}")]
    Encryption(SealedError),

    /// Publishing or fetching the sealed record failed.
    #[error("store stage: {0}")]
    Store(#[from] StoreError),

    /// The registry rejected the call.
    #[error("registry stage: {0}")]
    Registry(#[from] RegistryError),

    /// The fetched blob is not a sealed record.
    #[error("record stage: {0}")]
    Record(SealedError),

    /// The record did not open with the supplied key.
    #[error("decryption stage: {0}")]
    Decryption(SealedError),

    /// The decrypted document is not JSON (only from [`Orchestrator::retrieve_json`]).
    #[error("document is not valid JSON: {0}")]
    Document(#[from] serde_json::Error),
}

/// Retry policy for content store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles every retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_STORE_MAX_RETRIES,
            base_delay: DEFAULT_STORE_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Try exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `f`, retrying transient store failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        for attempt in 0..self.max_retries {
            match f().await {
                Err(e) if e.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "content store call failed, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
        // Final attempt, no more retries.
        f().await
    }
}

/// Issues and retrieves confidential credentials.
///
/// Collaborators are injected: any [`ContentStore`] works, and the registry
/// may be shared with an HTTP API or other orchestrators.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn ContentStore>,
    registry: SharedRegistry,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ContentStore>, registry: SharedRegistry) -> Self {
        Self {
            store,
            registry,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Seal `document` to `holder_key`, publish it, and record a credential
    /// for `holder`. Returns the new credential id.
    ///
    /// `issuer` must be the issuer of `credential_type_id`. That is checked
    /// up front, before anything is published, and again when recording.
    pub async fn issue(
        &self,
        issuer: &Address,
        credential_type_id: u64,
        holder: Address,
        holder_key: &EncryptionPublicKey,
        document: &[u8],
    ) -> Result<u64, IssuanceError> {
        self.registry.authorize_issue(issuer, credential_type_id)?;

        let record = sealed::encrypt(holder_key, document).map_err(IssuanceError::Encryption)?;
        let bytes = record.to_bytes();

        let hash = self
            .retry
            .run("publish", || self.store.publish(&bytes))
            .await?;

        let issuer = *issuer;
        let id = self
            .registry
            .with_write(move |reg| reg.issue_credential(&issuer, credential_type_id, holder, hash))
            .await?;
        Ok(id)
    }

    /// Fetch and open credential `credential_id` with the holder's keypair.
    pub async fn retrieve(
        &self,
        credential_id: u64,
        holder_key: &EncryptionKeypair,
    ) -> Result<Vec<u8>, IssuanceError> {
        let credential = self.registry.get_credential(credential_id)?;
        let hash = credential.content_hash;

        let bytes = self
            .retry
            .run("fetch", || self.store.fetch(&hash))
            .await?;

        let record = EncryptedRecord::from_bytes(&bytes).map_err(IssuanceError::Record)?;
        sealed::decrypt(holder_key, &record).map_err(IssuanceError::Decryption)
    }

    /// [`issue`](Self::issue) for a JSON document.
    pub async fn issue_json(
        &self,
        issuer: &Address,
        credential_type_id: u64,
        holder: Address,
        holder_key: &EncryptionPublicKey,
        document: &serde_json::Value,
    ) -> Result<u64, IssuanceError> {
        let bytes = serde_json::to_vec(document)?;
        self.issue(issuer, credential_type_id, holder, holder_key, &bytes)
            .await
    }

    /// [`retrieve`](Self::retrieve), parsing the document as JSON.
    pub async fn retrieve_json(
        &self,
        credential_id: u64,
        holder_key: &EncryptionKeypair,
    ) -> Result<serde_json::Value, IssuanceError> {
        let bytes = self.retrieve(credential_id, holder_key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
