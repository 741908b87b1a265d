//! # Sealed Credential Records
//!
//! Public-key encryption of credential documents to a single holder. This is
//! an ECIES construction built from the same parts as an ephemeral X25519
//! session, minus the round trip: the issuer plays both halves of the
//! handshake, using the holder's static public key as the peer.
//!
//! ## Construction
//!
//! ```text
//! eph            <- fresh X25519 secret (OsRng)
//! ephem_pk        = X25519(eph, G)
//! shared          = X25519(eph, holder_pk)          (must be contributory)
//! key             = BLAKE3-derive-key(SEALED_RECORD_KDF_CONTEXT,
//!                                     shared || ephem_pk || holder_pk)
//! aad             = version || ephem_pk || holder_pk
//! iv, ct, mac     = AES-256-GCM(key, document, aad)
//! ```
//!
//! Binding both public keys into the key derivation and the AAD means a
//! record re-targeted at a different holder, or carrying a swapped ephemeral
//! key, fails authentication instead of decrypting to garbage.
//!
//! ## Wire format
//!
//! [`EncryptedRecord::to_bytes`] produces compact JSON with a fixed field
//! order and lowercase hex values:
//!
//! ```text
//! {"iv":"…","ephemPublicKey":"…","ciphertext":"…","mac":"…"}
//! ```
//!
//! These exact bytes are what gets published and content-hashed, so the
//! serializer must stay byte-stable across releases.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::config::{
    AES_NONCE_LENGTH, AES_TAG_LENGTH, SEALED_RECORD_KDF_CONTEXT, SEALED_RECORD_VERSION,
    X25519_KEY_LENGTH,
};
use crate::crypto::encryption::{self, SealedParts};
use crate::crypto::hash::derive_key;
use crate::crypto::keys::{EncryptionKeypair, EncryptionPublicKey, KeyError};

/// Errors from sealing and opening credential records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealedError {
    /// The recipient public key is malformed or a degenerate curve point.
    #[error("invalid recipient public key")]
    InvalidKey,

    /// The record was not sealed to this key, or it has been tampered with.
    #[error("decryption failed -- record not addressed to this key or corrupted")]
    DecryptionFailed,

    /// The serialized record could not be parsed.
    #[error("malformed encrypted record: {0}")]
    MalformedRecord(String),
}

impl From<KeyError> for SealedError {
    fn from(_: KeyError) -> Self {
        SealedError::InvalidKey
    }
}

/// A credential document sealed to one holder's X25519 public key.
///
/// This is the exact payload stored in the content-addressable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    iv: [u8; AES_NONCE_LENGTH],
    ephem_public_key: [u8; X25519_KEY_LENGTH],
    ciphertext: Vec<u8>,
    mac: [u8; AES_TAG_LENGTH],
}

/// On-the-wire shape of [`EncryptedRecord`]. Field order is the
/// serialization order.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordWire {
    iv: String,
    #[serde(rename = "ephemPublicKey")]
    ephem_public_key: String,
    ciphertext: String,
    mac: String,
}

impl EncryptedRecord {
    /// The ephemeral X25519 public key used for key agreement.
    pub fn ephem_public_key(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.ephem_public_key
    }

    /// Ciphertext length, which equals the plaintext length.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }

    /// Serialize to the canonical JSON wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let wire = RecordWire {
            iv: hex::encode(self.iv),
            ephem_public_key: hex::encode(self.ephem_public_key),
            ciphertext: hex::encode(&self.ciphertext),
            mac: hex::encode(self.mac),
        };
        // A struct of four strings always serializes.
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    /// Parse the canonical JSON wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SealedError> {
        let wire: RecordWire = serde_json::from_slice(bytes)
            .map_err(|e| SealedError::MalformedRecord(e.to_string()))?;

        Ok(Self {
            iv: decode_fixed(&wire.iv, "iv")?,
            ephem_public_key: decode_fixed(&wire.ephem_public_key, "ephemPublicKey")?,
            ciphertext: hex::decode(&wire.ciphertext)
                .map_err(|e| SealedError::MalformedRecord(format!("ciphertext: {e}")))?,
            mac: decode_fixed(&wire.mac, "mac")?,
        })
    }

    fn parts(&self) -> SealedParts {
        SealedParts {
            nonce: self.iv,
            ciphertext: self.ciphertext.clone(),
            tag: self.mac,
        }
    }
}

fn decode_fixed<const N: usize>(hex_str: &str, field: &str) -> Result<[u8; N], SealedError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| SealedError::MalformedRecord(format!("{field}: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        SealedError::MalformedRecord(format!("{field}: expected {N} bytes, got {}", bytes.len()))
    })
}

fn record_aad(ephem: &[u8; X25519_KEY_LENGTH], recipient: &[u8; X25519_KEY_LENGTH]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + 2 * X25519_KEY_LENGTH);
    aad.push(SEALED_RECORD_VERSION);
    aad.extend_from_slice(ephem);
    aad.extend_from_slice(recipient);
    aad
}

fn record_key(
    shared: &[u8; 32],
    ephem: &[u8; X25519_KEY_LENGTH],
    recipient: &[u8; X25519_KEY_LENGTH],
) -> [u8; 32] {
    derive_key(SEALED_RECORD_KDF_CONTEXT, &[shared, ephem, recipient])
}

/// Seal `plaintext` to `recipient`.
///
/// Every call draws a fresh ephemeral key and IV, so sealing the same
/// document twice yields unrelated records (and unrelated content hashes).
///
/// # Example
///
/// ```
/// use credvault_protocol::crypto::keys::EncryptionKeypair;
/// use credvault_protocol::crypto::sealed::{decrypt, encrypt};
///
/// let holder = EncryptionKeypair::generate();
/// let record = encrypt(&holder.public_key(), br#"{"id":"did:x:1"}"#).unwrap();
/// assert_eq!(decrypt(&holder, &record).unwrap(), br#"{"id":"did:x:1"}"#);
/// ```
pub fn encrypt(
    recipient: &EncryptionPublicKey,
    plaintext: &[u8],
) -> Result<EncryptedRecord, SealedError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephem_public_key = X25519PublicKey::from(&ephemeral).to_bytes();

    let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(*recipient.as_bytes()));
    if !shared.was_contributory() {
        return Err(SealedError::InvalidKey);
    }

    let key = record_key(shared.as_bytes(), &ephem_public_key, recipient.as_bytes());
    let aad = record_aad(&ephem_public_key, recipient.as_bytes());
    let parts = encryption::encrypt_with_aad(&key, plaintext, &aad)
        .map_err(|_| SealedError::InvalidKey)?;

    tracing::debug!(plaintext_len = plaintext.len(), "sealed credential record");

    Ok(EncryptedRecord {
        iv: parts.nonce,
        ephem_public_key,
        ciphertext: parts.ciphertext,
        mac: parts.tag,
    })
}

/// Open a record with the holder's keypair.
///
/// Fails with [`SealedError::DecryptionFailed`] for a record sealed to any
/// other key and for any modification of the record. Plaintext is only
/// returned after the tag verifies.
pub fn decrypt(holder: &EncryptionKeypair, record: &EncryptedRecord) -> Result<Vec<u8>, SealedError> {
    let shared = holder.diffie_hellman(&record.ephem_public_key);
    if !shared.was_contributory() {
        return Err(SealedError::DecryptionFailed);
    }

    let recipient = holder.public_key();
    let key = record_key(shared.as_bytes(), &record.ephem_public_key, recipient.as_bytes());
    let aad = record_aad(&record.ephem_public_key, recipient.as_bytes());

    encryption::decrypt_with_aad(&key, &record.parts(), &aad)
        .map_err(|_| SealedError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = br#"{"id":"did:x:1"}"#;

    #[test]
    fn test_roundtrip() {
        let holder = EncryptionKeypair::generate();
        let record = encrypt(&holder.public_key(), DOC).unwrap();
        assert_eq!(decrypt(&holder, &record).unwrap(), DOC);
        assert_eq!(record.ciphertext_len(), DOC.len());
    }

    #[test]
    fn test_roundtrip_through_wire_format() {
        let holder = EncryptionKeypair::generate();
        let bytes = encrypt(&holder.public_key(), DOC).unwrap().to_bytes();
        let parsed = EncryptedRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.to_bytes(), bytes);
        assert_eq!(decrypt(&holder, &parsed).unwrap(), DOC);
    }

    #[test]
    fn test_wire_format_field_order() {
        let holder = EncryptionKeypair::generate();
        let bytes = encrypt(&holder.public_key(), b"x").unwrap().to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        let iv = text.find("\"iv\"").unwrap();
        let eph = text.find("\"ephemPublicKey\"").unwrap();
        let ct = text.find("\"ciphertext\"").unwrap();
        let mac = text.find("\"mac\"").unwrap();
        assert!(iv < eph && eph < ct && ct < mac);
        assert!(!text.contains(' '));
    }

    #[test]
    fn test_wrong_holder_fails() {
        let holder = EncryptionKeypair::generate();
        let stranger = EncryptionKeypair::generate();
        let record = encrypt(&holder.public_key(), DOC).unwrap();
        assert_eq!(decrypt(&stranger, &record), Err(SealedError::DecryptionFailed));
    }

    #[test]
    fn test_fresh_randomness_per_call() {
        let holder = EncryptionKeypair::generate();
        let a = encrypt(&holder.public_key(), DOC).unwrap();
        let b = encrypt(&holder.public_key(), DOC).unwrap();
        assert_ne!(a.ephem_public_key(), b.ephem_public_key());
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_tampered_mac_fails() {
        let holder = EncryptionKeypair::generate();
        let mut record = encrypt(&holder.public_key(), DOC).unwrap();
        record.mac[3] ^= 0x80;
        assert_eq!(decrypt(&holder, &record), Err(SealedError::DecryptionFailed));
    }

    #[test]
    fn test_swapped_ephemeral_key_fails() {
        let holder = EncryptionKeypair::generate();
        let mut record = encrypt(&holder.public_key(), DOC).unwrap();
        let other = encrypt(&holder.public_key(), DOC).unwrap();
        record.ephem_public_key = *other.ephem_public_key();
        assert_eq!(decrypt(&holder, &record), Err(SealedError::DecryptionFailed));
    }

    #[test]
    fn test_low_order_public_key_rejected() {
        // The all-zero point yields an all-zero shared secret.
        let bad = EncryptionPublicKey::from_bytes([0u8; 32]);
        assert_eq!(encrypt(&bad, DOC), Err(SealedError::InvalidKey));
    }

    #[test]
    fn test_malformed_wire_rejected() {
        assert!(matches!(
            EncryptedRecord::from_bytes(b"not json"),
            Err(SealedError::MalformedRecord(_))
        ));
        let short_iv = br#"{"iv":"00","ephemPublicKey":"00","ciphertext":"","mac":"00"}"#;
        assert!(matches!(
            EncryptedRecord::from_bytes(short_iv),
            Err(SealedError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_empty_document() {
        let holder = EncryptionKeypair::generate();
        let record = encrypt(&holder.public_key(), b"").unwrap();
        assert!(decrypt(&holder, &record).unwrap().is_empty());
    }
}
