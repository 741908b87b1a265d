//! # Protocol Configuration & Constants
//!
//! Every magic number in CredVault lives here. If you're hardcoding a
//! constant somewhere else, move it here.
//!
//! Some of these values are compatibility contracts rather than tuning knobs:
//! the KDF context, the record format version, and the content hash encoding
//! decide whether a blob written today can be read by a build from next year.
//! Those are marked as such.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the protocol library.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version tag of the sealed record scheme. Bump on any change to the key
/// derivation or the wire layout of [`crate::crypto::sealed::EncryptedRecord`].
pub const SEALED_RECORD_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Bech32 human-readable prefix for participant addresses.
pub const ADDRESS_HRP: &str = "cred";

/// Length of the address payload (BLAKE3 of the Ed25519 public key).
pub const ADDRESS_PAYLOAD_LENGTH: usize = 32;

/// Ed25519 signing key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// X25519 for the ephemeral/static Diffie-Hellman in sealed records.
pub const KEY_EXCHANGE_ALGORITHM: &str = "X25519";

/// X25519 public and secret key length in bytes.
pub const X25519_KEY_LENGTH: usize = 32;

/// AES-256-GCM for the record body.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not 16.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// BLAKE3 `derive_key` context for sealed record keys.
///
/// Compatibility contract: changing this string makes every existing blob
/// undecryptable.
pub const SEALED_RECORD_KDF_CONTEXT: &str = "credvault v1 sealed record key";

/// Hash output length in bytes (SHA-256 and BLAKE3 alike).
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Content Addressing
// ---------------------------------------------------------------------------

/// Multihash code for SHA2-256.
///
/// Compatibility contract: content hashes are `base58btc(0x12 0x20 || sha256)`,
/// the CIDv0 shape, so every hash starts with `Qm`.
pub const MULTIHASH_SHA2_256: u8 = 0x12;

/// Multihash digest length prefix for a 32-byte digest.
pub const MULTIHASH_DIGEST_LENGTH: u8 = 0x20;

/// Length of an encoded content hash string.
pub const CONTENT_HASH_STRING_LENGTH: usize = 46;

/// Largest blob the HTTP store client will upload or accept. Sealed
/// credential documents are small; anything near this is a mistake.
pub const MAX_BLOB_SIZE: usize = 4 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maximum credential type name length in bytes.
pub const MAX_CREDENTIAL_TYPE_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Store Retry
// ---------------------------------------------------------------------------

/// Additional attempts after the first failed store call.
pub const DEFAULT_STORE_MAX_RETRIES: u32 = 3;

/// Base delay between store retries. Doubles each attempt: 200ms, 400ms, 800ms.
pub const DEFAULT_STORE_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Per-request timeout for the HTTP store client.
pub const DEFAULT_STORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port of the node.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(X25519_KEY_LENGTH, 32);
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
        assert_eq!(HASH_OUTPUT_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
    }

    #[test]
    fn test_multihash_prefix_matches_digest() {
        assert_eq!(MULTIHASH_DIGEST_LENGTH as usize, HASH_OUTPUT_LENGTH);
    }

    #[test]
    fn test_retry_defaults_sanity() {
        // Worst case backoff must stay well under the request timeout budget
        // a caller would reasonably wait for a single issuance.
        let worst: u64 = (0..DEFAULT_STORE_MAX_RETRIES)
            .map(|a| DEFAULT_STORE_RETRY_BASE_DELAY.as_millis() as u64 * 2u64.pow(a))
            .sum();
        assert!(worst < 10_000);
    }

    #[test]
    fn test_ports_are_distinct() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }
}
