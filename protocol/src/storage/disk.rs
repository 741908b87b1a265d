//! # Persistent Blob Store
//!
//! A [`ContentStore`] on top of sled. The node uses it to serve the blob
//! HTTP endpoint, so a development deployment survives restarts without a
//! separate IPFS daemon.
//!
//! ## Tree Layout
//!
//! | Tree    | Key                     | Value      |
//! |---------|-------------------------|------------|
//! | `blobs` | SHA-256 digest (32B)    | raw bytes  |
//!
//! Keys are the bare digest rather than the base58 string: shorter, and
//! the multihash prefix is constant anyway.

use std::path::Path;

use async_trait::async_trait;
use sled::{Db, Tree};

use super::cas::{verify_fetched, ContentHash, ContentStore, StoreError};

const BLOBS_TREE: &str = "blobs";

/// sled-backed content store.
///
/// sled trees are thread-safe, so `SledStore` can be shared via `Arc`
/// without external locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    blobs: Tree,
}

impl SledStore {
    /// Open or create a blob store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, sled::Error> {
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway store, deleted on drop.
    pub fn open_temporary() -> Result<Self, sled::Error> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    /// Use the `blobs` tree of an already open database.
    pub fn from_db(db: Db) -> Result<Self, sled::Error> {
        let blobs = db.open_tree(BLOBS_TREE)?;
        Ok(Self { db, blobs })
    }

    /// Number of blobs held.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

fn unavailable(e: sled::Error) -> StoreError {
    StoreError::StoreUnavailable(format!("sled: {e}"))
}

#[async_trait]
impl ContentStore for SledStore {
    async fn publish(&self, bytes: &[u8]) -> Result<ContentHash, StoreError> {
        let hash = ContentHash::of(bytes);
        let inserted = self
            .blobs
            .compare_and_swap(hash.digest(), None as Option<&[u8]>, Some(bytes))
            .map_err(unavailable)?;
        if inserted.is_ok() {
            self.db.flush_async().await.map_err(unavailable)?;
            tracing::debug!(%hash, size = bytes.len(), "stored blob");
        }
        Ok(hash)
    }

    async fn fetch(&self, hash: &ContentHash) -> Result<Vec<u8>, StoreError> {
        let bytes = self
            .blobs
            .get(hash.digest())
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound(*hash))?;
        verify_fetched(hash, bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_fetch() {
        let store = SledStore::open_temporary().unwrap();
        let hash = store.publish(b"on disk").await.unwrap();
        assert_eq!(store.fetch(&hash).await.unwrap(), b"on disk");
    }

    #[tokio::test]
    async fn publish_is_idempotent() {
        let store = SledStore::open_temporary().unwrap();
        store.publish(b"twice").await.unwrap();
        store.publish(b"twice").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let store = SledStore::open_temporary().unwrap();
        let hash = ContentHash::of(b"absent");
        assert_eq!(store.fetch(&hash).await, Err(StoreError::NotFound(hash)));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hash = {
            let store = SledStore::open(dir.path()).unwrap();
            store.publish(b"durable").await.unwrap()
        };
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.fetch(&hash).await.unwrap(), b"durable");
    }
}
