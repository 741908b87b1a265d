//! # Participant Addresses
//!
//! An [`Address`] is how issuers, holders, and the registry owner are named
//! everywhere in CredVault. It is derived from the participant's Ed25519
//! public key via BLAKE3 hashing and Bech32 encoding:
//!
//! ```text
//! public_key (32 bytes)
//!     -> BLAKE3(public_key) -> 32 bytes
//!     -> Bech32("cred", hash) -> cred1qw508d6qe...
//! ```
//!
//! The `cred` prefix makes addresses recognizable at a glance, and the
//! Bech32 checksum catches copy-paste mistakes before they turn into a
//! credential issued to nobody.
//!
//! The registry treats addresses as opaque: it only compares them. Nothing
//! in the ledger needs the public key behind an address, so unlike a
//! signing identity an `Address` carries only the hash.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ADDRESS_HRP, ADDRESS_PAYLOAD_LENGTH};
use crate::crypto::keys::SigningPublicKey;

/// Errors that can occur while parsing an address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The Bech32 string could not be decoded (bad charset or checksum).
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The decoded data has an unexpected length.
    #[error("invalid address data length: expected {expected} bytes, got {got}")]
    InvalidDataLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },
}

/// An opaque, checksummed participant identifier.
///
/// # Examples
///
/// ```
/// use credvault_protocol::crypto::SigningKeypair;
/// use credvault_protocol::identity::Address;
///
/// let kp = SigningKeypair::generate();
/// let address = Address::from_public_key(&kp.public_key());
/// assert!(address.to_string().starts_with("cred1"));
///
/// let parsed = Address::parse(&address.to_string()).unwrap();
/// assert_eq!(address, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    key_hash: [u8; ADDRESS_PAYLOAD_LENGTH],
}

impl Address {
    /// Derive the address of an Ed25519 public key.
    pub fn from_public_key(pk: &SigningPublicKey) -> Self {
        Self {
            key_hash: *blake3::hash(pk.as_bytes()).as_bytes(),
        }
    }

    /// Build an address directly from its 32-byte payload.
    ///
    /// Mostly useful in tests, where a readable fixed address beats a
    /// freshly generated key.
    pub fn from_key_hash(key_hash: [u8; ADDRESS_PAYLOAD_LENGTH]) -> Self {
        Self { key_hash }
    }

    /// Parse a Bech32-encoded address.
    ///
    /// Validates the HRP, checksum, and data length.
    pub fn parse(addr: &str) -> Result<Self, AddressError> {
        let (hrp, data) =
            bech32::decode(addr).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

        if hrp.as_str() != ADDRESS_HRP {
            return Err(AddressError::InvalidHrp {
                expected: ADDRESS_HRP.to_string(),
                got: hrp.to_string(),
            });
        }

        let key_hash: [u8; ADDRESS_PAYLOAD_LENGTH] =
            data.as_slice()
                .try_into()
                .map_err(|_| AddressError::InvalidDataLength {
                    expected: ADDRESS_PAYLOAD_LENGTH,
                    got: data.len(),
                })?;

        Ok(Self { key_hash })
    }

    /// Return the raw 32-byte BLAKE3 hash underlying this address.
    pub fn key_hash(&self) -> &[u8; ADDRESS_PAYLOAD_LENGTH] {
        &self.key_hash
    }

    /// Encode as a Bech32 string.
    pub fn to_bech32(&self) -> String {
        // Both inputs are fixed: a constant HRP and a 32-byte payload are
        // always within Bech32's limits.
        match Hrp::parse(ADDRESS_HRP) {
            Ok(hrp) => bech32::encode::<Bech32>(hrp, &self.key_hash).unwrap_or_default(),
            Err(_) => String::new(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bech32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_bech32())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_bech32())
        } else {
            serializer.serialize_bytes(&self.key_hash)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::parse(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let key_hash: [u8; ADDRESS_PAYLOAD_LENGTH] =
                bytes.as_slice().try_into().map_err(|_| {
                    serde::de::Error::custom(format!(
                        "expected {ADDRESS_PAYLOAD_LENGTH}-byte key hash, got {}",
                        bytes.len()
                    ))
                })?;
            Ok(Address { key_hash })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigningKeypair;

    #[test]
    fn address_starts_with_cred1() {
        let kp = SigningKeypair::generate();
        let addr = Address::from_public_key(&kp.public_key()).to_string();
        assert!(addr.starts_with("cred1"), "address was: {}", addr);
    }

    #[test]
    fn address_roundtrip() {
        let kp = SigningKeypair::generate();
        let id = Address::from_public_key(&kp.public_key());
        let recovered = Address::parse(&id.to_string()).unwrap();
        assert_eq!(id, recovered);
        assert_eq!("cred1".len() + 52 + 6, id.to_string().len());
    }

    #[test]
    fn deterministic_address_from_same_key() {
        let kp = SigningKeypair::from_seed(&[7u8; 32]);
        let a = Address::from_public_key(&kp.public_key());
        let b = Address::from_public_key(&kp.public_key());
        assert_eq!(a, b);
        assert_ne!(a, Address::from_public_key(&SigningKeypair::from_seed(&[8u8; 32]).public_key()));
    }

    #[test]
    fn invalid_hrp_rejected() {
        let hrp = Hrp::parse("nova").unwrap();
        let encoded = bech32::encode::<Bech32>(hrp, &[0u8; 32]).unwrap();
        let err = Address::parse(&encoded).unwrap_err();
        assert!(matches!(err, AddressError::InvalidHrp { .. }));
    }

    #[test]
    fn wrong_payload_length_rejected() {
        let hrp = Hrp::parse(ADDRESS_HRP).unwrap();
        let encoded = bech32::encode::<Bech32>(hrp, &[0u8; 20]).unwrap();
        assert_eq!(
            Address::parse(&encoded),
            Err(AddressError::InvalidDataLength { expected: 32, got: 20 })
        );
    }

    #[test]
    fn corrupted_address_rejected() {
        let kp = SigningKeypair::generate();
        let addr = Address::from_public_key(&kp.public_key()).to_string();
        let mid = addr.len() / 2;
        let replacement = if addr.as_bytes()[mid] == b'q' { "p" } else { "q" };
        let corrupted = format!("{}{}{}", &addr[..mid], replacement, &addr[mid + 1..]);
        assert!(Address::parse(&corrupted).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            Address::parse("not an address"),
            Err(AddressError::Bech32Decode(_))
        ));
    }

    #[test]
    fn serde_json_uses_bech32_string() {
        let id = Address::from_key_hash([3u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let recovered: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(id, recovered);
    }
}
