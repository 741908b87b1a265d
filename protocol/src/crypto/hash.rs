//! # Hashing Utilities
//!
//! Two hash functions, each with a fixed job:
//!
//! - **SHA-256** names blobs in the content-addressable store. It is the
//!   digest inside the multihash, because that is what the IPFS ecosystem
//!   expects to find there.
//!
//! - **BLAKE3** derives addresses from public keys and, in `derive_key` mode,
//!   turns X25519 shared secrets into AES keys.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// # Example
///
/// ```
/// use credvault_protocol::crypto::sha256;
///
/// let hash = sha256(b"credvault");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated key using BLAKE3's `derive_key` mode.
///
/// The parts are fed sequentially, so callers never build a temporary
/// concatenation buffer holding secret material.
pub fn derive_key(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.to_vec(), expected);
    }

    #[test]
    fn sha256_deterministic() {
        assert_eq!(sha256(b"cred"), sha256(b"cred"));
        assert_ne!(sha256(b"cred"), sha256(b"Cred"));
    }

    #[test]
    fn blake3_deterministic() {
        let a = blake3_hash(b"cred");
        let b = blake3_hash(b"cred");
        assert_eq!(a, b);
        assert_ne!(a, blake3_hash(b"Cred"));
    }

    #[test]
    fn test_derive_key_context_separation() {
        let a = derive_key("context-a", &[b"same data"]);
        let b = derive_key("context-b", &[b"same data"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_derive_key_parts_equal_concatenation() {
        let split = derive_key("ctx", &[b"hello", b" world"]);
        let joined = derive_key("ctx", &[b"hello world"]);
        assert_eq!(split, joined);
        assert_ne!(split, blake3_hash(b"hello world"));
    }
}
