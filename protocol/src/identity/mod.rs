//! # Identity Module
//!
//! Every participant in CredVault (the registry owner, issuers, holders) is
//! named by an [`Address`]: a Bech32 string with the `cred` prefix, derived
//! from an Ed25519 public key.
//!
//! Key material lives in [`crate::crypto::keys`]. Registry callers prove
//! control of an address by signing with the matching
//! [`SigningKeypair`](crate::crypto::SigningKeypair); holders additionally
//! carry an X25519 [`EncryptionKeypair`](crate::crypto::EncryptionKeypair)
//! that credential documents are sealed to.

pub mod address;

pub use address::{Address, AddressError};
