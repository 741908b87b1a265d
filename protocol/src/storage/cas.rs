//! # Content Addressing
//!
//! Blobs are named by what they contain. A [`ContentHash`] is the CIDv0
//! form used by IPFS: the SHA-256 multihash of the bytes, base58btc encoded.
//!
//! ```text
//! bytes -> SHA-256 -> 0x12 0x20 || digest (34 bytes) -> base58btc -> "Qm..." (46 chars)
//! ```
//!
//! The `0x12` is the multihash code for sha2-256 and `0x20` is the digest
//! length. Those two fixed leading bytes are why every hash starts with `Qm`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{
    CONTENT_HASH_STRING_LENGTH, HASH_OUTPUT_LENGTH, MULTIHASH_DIGEST_LENGTH, MULTIHASH_SHA2_256,
};
use crate::crypto::sha256;

/// Errors returned by content store backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No blob is stored under the requested hash.
    #[error("blob not found: {0}")]
    NotFound(ContentHash),

    /// The store could not be reached or failed transiently.
    #[error("content store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store returned bytes that do not hash to what was asked for.
    #[error("content store returned corrupted data for {expected}: got {actual}")]
    Corrupted {
        /// The hash that was requested or computed locally.
        expected: ContentHash,
        /// The hash of what actually came back.
        actual: String,
    },

    /// The store answered and refused the request (an HTTP 4xx other than
    /// 404). Sending the same request again gets the same answer.
    #[error("content store rejected {operation}: HTTP {status}: {body}")]
    Rejected {
        operation: String,
        status: u16,
        body: String,
    },

    /// A string could not be parsed as a content hash.
    #[error("invalid content hash: {0}")]
    InvalidHash(String),
}

impl StoreError {
    /// Whether repeating the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StoreUnavailable(_))
    }
}

/// A CIDv0-style content hash.
///
/// Serializes as its base58 string in every format, so journals and API
/// payloads carry the same text the store speaks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    digest: [u8; HASH_OUTPUT_LENGTH],
}

impl ContentHash {
    /// Compute the content hash of `bytes`.
    ///
    /// ```
    /// use credvault_protocol::storage::ContentHash;
    ///
    /// let hash = ContentHash::of(b"hello");
    /// assert_eq!(hash.to_string(), "QmRN6wdp1S2A5EtjW9A3M1vKSBuQQGcgvuhoMUoEz4iiT5");
    /// ```
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            digest: sha256(bytes),
        }
    }

    /// Parse a base58btc multihash string.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        if s.len() != CONTENT_HASH_STRING_LENGTH {
            return Err(StoreError::InvalidHash(format!(
                "expected {CONTENT_HASH_STRING_LENGTH} characters, got {}",
                s.len()
            )));
        }

        let raw = bs58::decode(s)
            .into_vec()
            .map_err(|e| StoreError::InvalidHash(e.to_string()))?;

        match raw.as_slice() {
            [code, len, digest @ ..]
                if *code == MULTIHASH_SHA2_256
                    && *len == MULTIHASH_DIGEST_LENGTH
                    && digest.len() == HASH_OUTPUT_LENGTH =>
            {
                let mut out = [0u8; HASH_OUTPUT_LENGTH];
                out.copy_from_slice(digest);
                Ok(Self { digest: out })
            }
            _ => Err(StoreError::InvalidHash(
                "not a sha2-256 multihash".to_string(),
            )),
        }
    }

    /// The raw SHA-256 digest.
    pub fn digest(&self) -> &[u8; HASH_OUTPUT_LENGTH] {
        &self.digest
    }

    /// Whether `bytes` hash to this value.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        sha256(bytes) == self.digest
    }

    fn to_base58(self) -> String {
        let mut multihash = Vec::with_capacity(2 + HASH_OUTPUT_LENGTH);
        multihash.push(MULTIHASH_SHA2_256);
        multihash.push(MULTIHASH_DIGEST_LENGTH);
        multihash.extend_from_slice(&self.digest);
        bs58::encode(multihash).into_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_base58())
    }
}

impl FromStr for ContentHash {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_base58()
    }
}

/// A content-addressable blob store.
///
/// Implementations must be `Send + Sync`: the orchestrator and the node
/// share one instance behind an `Arc` across tasks.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` and return their content hash. Publishing the same
    /// bytes twice returns the same hash and stores one copy.
    async fn publish(&self, bytes: &[u8]) -> Result<ContentHash, StoreError>;

    /// Retrieve the bytes stored under `hash`.
    ///
    /// Implementations verify the returned bytes against `hash` and fail
    /// with [`StoreError::Corrupted`] on mismatch.
    async fn fetch(&self, hash: &ContentHash) -> Result<Vec<u8>, StoreError>;
}

/// Check fetched bytes against the hash they were requested under.
pub(crate) fn verify_fetched(hash: &ContentHash, bytes: Vec<u8>) -> Result<Vec<u8>, StoreError> {
    if hash.matches(&bytes) {
        Ok(bytes)
    } else {
        Err(StoreError::Corrupted {
            expected: *hash,
            actual: ContentHash::of(&bytes).to_string(),
        })
    }
}
