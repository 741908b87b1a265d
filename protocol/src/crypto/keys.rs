//! # Key Management
//!
//! CredVault participants carry two kinds of keys, for two different jobs:
//!
//! - **Ed25519 signing keys** ([`SigningKeypair`]) prove *who is calling* the
//!   registry. The caller's [`Address`](crate::identity::Address) is derived
//!   from the Ed25519 public key.
//! - **X25519 encryption keys** ([`EncryptionKeypair`]) decide *who can read*
//!   a credential document. Issuers seal documents to the holder's X25519
//!   public key; only the matching secret opens them.
//!
//! ## Security considerations
//!
//! - Private keys are generated from `OsRng`.
//! - Neither keypair implements `Serialize`. Exporting secret material is an
//!   explicit `*_hex()` call, never a side effect of dumping a struct to JSON.
//! - `Debug` output never includes secret bytes.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::config::{SIGNATURE_LENGTH, SIGNING_KEY_LENGTH, X25519_KEY_LENGTH};

/// Errors that can occur while parsing or validating key material.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid signature bytes: expected {SIGNATURE_LENGTH} bytes")]
    InvalidSignature,
}

/// Decode a hex string into a fixed 32-byte array.
fn decode_hex_32(hex_str: &str, err: KeyError) -> Result<[u8; 32], KeyError> {
    let bytes = hex::decode(hex_str.trim()).map_err(|_| err.clone())?;
    bytes.as_slice().try_into().map_err(|_| err)
}

// ---------------------------------------------------------------------------
// Ed25519: caller authentication
// ---------------------------------------------------------------------------

/// An Ed25519 keypair used to sign registry calls.
///
/// # Examples
///
/// ```
/// use credvault_protocol::crypto::keys::SigningKeypair;
///
/// let kp = SigningKeypair::generate();
/// let sig = kp.sign(b"add issuer");
/// assert!(kp.public_key().verify(b"add issuer", &sig));
/// ```
pub struct SigningKeypair {
    signing_key: SigningKey,
}

/// The public half of a [`SigningKeypair`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature. Always 64 bytes when produced by this crate; a
/// signature of any other length simply fails verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSignature {
    bytes: Vec<u8>,
}

impl SigningKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SIGNING_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let seed = decode_hex_32(hex_str, KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> SigningPublicKey {
        SigningPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Deterministic per RFC 8032.
    pub fn sign(&self, message: &[u8]) -> CallSignature {
        CallSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    /// Export the secret key as hex. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeypair(pub={})", self.public_key().to_hex())
    }
}

impl SigningPublicKey {
    /// Parse and validate raw public key bytes.
    ///
    /// Not every 32-byte string is a valid Ed25519 point; those are rejected
    /// here rather than failing obscurely during verification.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Hex-encoded representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Verify a signature. Uses strict verification; any failure is `false`.
    pub fn verify(&self, message: &[u8], signature: &CallSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify_strict(message, &sig).is_ok()
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningPublicKey({})", self.to_hex())
    }
}

impl CallSignature {
    /// Parse a hex-encoded signature. Length is checked here so malformed
    /// input is reported as such instead of as a failed verification.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSignature)?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }

    /// Hex-encoded representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallSignature({})", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// X25519: document confidentiality
// ---------------------------------------------------------------------------

/// A holder's static X25519 keypair. Documents sealed to
/// [`EncryptionKeypair::public_key`] open only with this keypair.
pub struct EncryptionKeypair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

/// An X25519 public key that documents are sealed to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptionPublicKey {
    bytes: [u8; X25519_KEY_LENGTH],
}

impl EncryptionKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Reconstruct a keypair from raw secret bytes. X25519 clamps the scalar,
    /// so every 32-byte input is a usable secret.
    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = decode_hex_32(hex_str, KeyError::InvalidSecretKey)?;
        Ok(Self::from_secret_bytes(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public key to hand to issuers.
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey {
            bytes: self.public.to_bytes(),
        }
    }

    /// Hex-encoded public key.
    pub fn public_key_hex(&self) -> String {
        self.public_key().to_hex()
    }

    /// Export the secret key as hex. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Diffie-Hellman with a peer public key. Crate-internal: callers go
    /// through [`crate::crypto::sealed`].
    pub(crate) fn diffie_hellman(&self, peer: &[u8; X25519_KEY_LENGTH]) -> x25519_dalek::SharedSecret {
        self.secret.diffie_hellman(&X25519PublicKey::from(*peer))
    }
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret.to_bytes())
    }
}

impl fmt::Debug for EncryptionKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKeypair(pub={})", self.public_key_hex())
    }
}

impl EncryptionPublicKey {
    /// Wrap raw public key bytes. Degenerate (low-order) points are caught at
    /// encryption time, where the shared secret reveals them.
    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Parse a public key from a byte slice of exactly 32 bytes.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; X25519_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        Ok(Self {
            bytes: decode_hex_32(hex_str, KeyError::InvalidPublicKey)?,
        })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.bytes
    }

    /// Hex-encoded representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", self.to_hex())
    }
}

impl fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"payload");
        assert!(kp.public_key().verify(b"payload", &sig));
        assert!(!kp.public_key().verify(b"other payload", &sig));
    }

    #[test]
    fn test_wrong_key_rejects_signature() {
        let a = SigningKeypair::generate();
        let b = SigningKeypair::generate();
        let sig = a.sign(b"payload");
        assert!(!b.public_key().verify(b"payload", &sig));
    }

    #[test]
    fn test_signing_keypair_hex_roundtrip() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_signing_public_key_hex_roundtrip() {
        let pk = SigningKeypair::generate().public_key();
        assert_eq!(SigningPublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
        assert_eq!(
            SigningPublicKey::from_hex("abcd"),
            Err(KeyError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_signature_hex_length_checked() {
        let sig = SigningKeypair::generate().sign(b"x");
        assert_eq!(CallSignature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert_eq!(
            CallSignature::from_hex(&"00".repeat(63)),
            Err(KeyError::InvalidSignature)
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let kp = SigningKeypair::generate();
        assert!(!format!("{:?}", kp).contains(&kp.secret_key_hex()));

        let ekp = EncryptionKeypair::generate();
        assert!(!format!("{:?}", ekp).contains(&ekp.secret_key_hex()));
    }

    #[test]
    fn test_encryption_keypair_hex_roundtrip() {
        let kp = EncryptionKeypair::generate();
        let restored = EncryptionKeypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_encryption_public_key_parsing() {
        let pk = EncryptionKeypair::generate().public_key();
        assert_eq!(EncryptionPublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
        assert!(EncryptionPublicKey::from_hex("zz").is_err());
        assert!(EncryptionPublicKey::try_from_slice(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_diffie_hellman_agrees() {
        let a = EncryptionKeypair::generate();
        let b = EncryptionKeypair::generate();
        let ab = a.diffie_hellman(b.public_key().as_bytes());
        let ba = b.diffie_hellman(a.public_key().as_bytes());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }
}
