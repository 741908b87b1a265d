//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for the body of a sealed credential record.
//!
//! GCM is unforgiving about nonce reuse: two messages under the same key and
//! nonce leak the XOR of the plaintexts and let an attacker forge tags. Every
//! sealed record derives a fresh key from a fresh ephemeral X25519 secret, and
//! the nonce is still drawn from the OS CSPRNG on top of that.
//!
//! ## Wire format
//!
//! Unlike a generic `nonce || ciphertext` blob, sealed records carry the
//! nonce and the tag as separate fields, so [`encrypt_with_aad`] returns the
//! three parts split apart and [`decrypt_with_aad`] takes them back the same
//! way.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// Kept vague on purpose: "wrong key" and "corrupted ciphertext" look the
/// same from the outside.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,
}

/// Output of [`encrypt_with_aad`]: the three parts of an AEAD message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedParts {
    /// Random 96-bit nonce.
    pub nonce: [u8; AES_NONCE_LENGTH],
    /// Ciphertext without the tag. Same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// 128-bit GCM authentication tag.
    pub tag: [u8; AES_TAG_LENGTH],
}

/// Encrypt with Additional Authenticated Data (AAD) under a random nonce.
///
/// The AAD is authenticated but not encrypted. The caller must provide the
/// same AAD at decryption time, or authentication fails.
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedParts, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    // aes-gcm appends the tag to the ciphertext; split it off.
    if sealed.len() < AES_TAG_LENGTH {
        return Err(EncryptionError::EncryptFailed);
    }
    let tag_bytes = sealed.split_off(sealed.len() - AES_TAG_LENGTH);
    let mut tag = [0u8; AES_TAG_LENGTH];
    tag.copy_from_slice(&tag_bytes);

    Ok(SealedParts {
        nonce,
        ciphertext: sealed,
        tag,
    })
}

/// Decrypt parts produced by [`encrypt_with_aad`].
///
/// Nonce, tag, and AAD must all match the values used during encryption.
/// Any mismatch is a tampered or misaddressed message and fails as a whole:
/// no partial plaintext is ever returned.
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    parts: &SealedParts,
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    let mut combined = Vec::with_capacity(parts.ciphertext.len() + AES_TAG_LENGTH);
    combined.extend_from_slice(&parts.ciphertext);
    combined.extend_from_slice(&parts.tag);

    cipher
        .decrypt(
            Nonce::from_slice(&parts.nonce),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}
