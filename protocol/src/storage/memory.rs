//! In-process content store.
//!
//! Backed by a [`DashMap`], so concurrent publishers and fetchers never
//! contend on a single lock. Used by tests, benchmarks, and embedded
//! deployments that don't need blobs to outlive the process.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::cas::{verify_fetched, ContentHash, ContentStore, StoreError};

/// A `DashMap`-backed [`ContentStore`].
///
/// Cloning is cheap and clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<DashMap<ContentHash, Vec<u8>>>,
    failures_pending: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls (publish or fetch) fail with
    /// [`StoreError::StoreUnavailable`].
    pub fn fail_next(&self, n: u32) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Overwrite the bytes stored under `hash` without rehashing.
    ///
    /// Simulates a misbehaving store in tests.
    pub fn corrupt(&self, hash: &ContentHash, bytes: Vec<u8>) {
        self.blobs.insert(*hash, bytes);
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        let took = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match took {
            Ok(_) => Err(StoreError::StoreUnavailable(
                "injected failure".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn publish(&self, bytes: &[u8]) -> Result<ContentHash, StoreError> {
        self.injected_failure()?;
        let hash = ContentHash::of(bytes);
        self.blobs.entry(hash).or_insert_with(|| bytes.to_vec());
        tracing::debug!(%hash, size = bytes.len(), "published blob to memory store");
        Ok(hash)
    }

    async fn fetch(&self, hash: &ContentHash) -> Result<Vec<u8>, StoreError> {
        self.injected_failure()?;
        let bytes = self
            .blobs
            .get(hash)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*hash))?;
        verify_fetched(hash, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_fetch() {
        let store = MemoryStore::new();
        let hash = store.publish(b"sealed").await.unwrap();
        assert_eq!(hash, ContentHash::of(b"sealed"));
        assert_eq!(store.fetch(&hash).await.unwrap(), b"sealed");
    }

    #[tokio::test]
    async fn publish_deduplicates() {
        let store = MemoryStore::new();
        let a = store.publish(b"same").await.unwrap();
        let b = store.publish(b"same").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn fetch_unknown_is_not_found() {
        let store = MemoryStore::new();
        let hash = ContentHash::of(b"never stored");
        assert_eq!(store.fetch(&hash).await, Err(StoreError::NotFound(hash)));
    }

    #[tokio::test]
    async fn fail_next_counts_down() {
        let store = MemoryStore::new();
        store.fail_next(2);
        assert!(matches!(
            store.publish(b"x").await,
            Err(StoreError::StoreUnavailable(_))
        ));
        assert!(store.publish(b"x").await.is_err());
        assert!(store.publish(b"x").await.is_ok());
    }

    #[tokio::test]
    async fn corrupted_blob_detected() {
        let store = MemoryStore::new();
        let hash = store.publish(b"original").await.unwrap();
        store.corrupt(&hash, b"tampered".to_vec());
        assert!(matches!(
            store.fetch(&hash).await,
            Err(StoreError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn clones_share_blobs() {
        let store = MemoryStore::new();
        let clone = store.clone();
        let hash = store.publish(b"shared").await.unwrap();
        assert_eq!(clone.fetch(&hash).await.unwrap(), b"shared");
    }
}
