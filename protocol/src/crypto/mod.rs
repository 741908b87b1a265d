//! # Cryptographic Primitives for CredVault
//!
//! Everything that touches key material flows through here:
//!
//! - **X25519** for sealing credential documents to a holder.
//! - **AES-256-GCM** for the sealed record body.
//! - **BLAKE3** for key derivation and address hashing.
//! - **SHA-256** for content hashes, because that's what content-addressed
//!   stores speak.
//! - **Ed25519** for authenticating registry callers.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. No hand-rolled primitives.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod sealed;

pub use hash::{blake3_hash, sha256};
pub use keys::{CallSignature, EncryptionKeypair, EncryptionPublicKey, SigningKeypair, SigningPublicKey};
pub use sealed::{decrypt, encrypt, EncryptedRecord, SealedError};
