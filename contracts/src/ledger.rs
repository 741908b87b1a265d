//! # Credential Ledger
//!
//! Issued credentials and the per-holder index over them. A credential
//! references its payload only by [`ContentHash`]; the sealed document
//! itself lives in a content store.
//!
//! ## Holder Index
//!
//! ```text
//! holder -> [credential id, credential id, ...]   (issuance order)
//! ```
//!
//! The record and its index entry are written together in
//! [`CredentialLedger::push`], which is the only mutation. There is no
//! state in which one exists without the other.

use std::collections::HashMap;

use credvault_protocol::identity::Address;
use credvault_protocol::storage::ContentHash;
use serde::{Deserialize, Serialize};

use crate::registry::{Entity, RegistryError};

/// An issued credential. Terminal once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: u64,
    pub credential_type_id: u64,
    pub holder: Address,
    /// Hash of the sealed record in the content store.
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialLedger {
    credentials: Vec<Credential>,
    by_holder: HashMap<Address, Vec<u64>>,
}

impl CredentialLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.credentials.len() as u64
    }

    pub fn len(&self) -> u64 {
        self.credentials.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn get(&self, id: u64) -> Result<&Credential, RegistryError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.credentials.get(idx))
            .ok_or(RegistryError::NotFound {
                entity: Entity::Credential,
                id,
            })
    }

    /// Number of credentials issued to `holder`. Zero for unknown holders.
    pub fn holder_count(&self, holder: &Address) -> u64 {
        self.by_holder.get(holder).map_or(0, |ids| ids.len() as u64)
    }

    /// The `index`-th credential issued to `holder`, in issuance order.
    pub fn by_holder(&self, holder: &Address, index: u64) -> Result<&Credential, RegistryError> {
        let ids = self.by_holder.get(holder).map(Vec::as_slice).unwrap_or(&[]);
        let count = ids.len() as u64;
        let id = usize::try_from(index)
            .ok()
            .and_then(|idx| ids.get(idx))
            .ok_or(RegistryError::IndexOutOfRange { index, count })?;
        self.get(*id)
    }

    /// Every credential issued to `holder`, in issuance order.
    pub fn all_by_holder(&self, holder: &Address) -> Vec<Credential> {
        self.by_holder
            .get(holder)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(*id).ok().cloned())
            .collect()
    }

    /// Append a credential and index it under its holder.
    pub(crate) fn push(&mut self, credential: Credential) {
        debug_assert_eq!(credential.id, self.next_id());
        self.by_holder
            .entry(credential.holder)
            .or_default()
            .push(credential.id);
        self.credentials.push(credential);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_key_hash([n; 32])
    }

    fn cred(ledger: &CredentialLedger, holder: Address) -> Credential {
        Credential {
            id: ledger.next_id(),
            credential_type_id: 0,
            holder,
            content_hash: ContentHash::of(&ledger.next_id().to_be_bytes()),
        }
    }

    #[test]
    fn holder_index_tracks_issuance_order() {
        let mut ledger = CredentialLedger::new();
        for holder in [addr(1), addr(2), addr(1)] {
            let c = cred(&ledger, holder);
            ledger.push(c);
        }
        assert_eq!(ledger.holder_count(&addr(1)), 2);
        assert_eq!(ledger.by_holder(&addr(1), 0).unwrap().id, 0);
        assert_eq!(ledger.by_holder(&addr(1), 1).unwrap().id, 2);
        assert_eq!(ledger.by_holder(&addr(2), 0).unwrap().id, 1);
        let ids: Vec<u64> = ledger.all_by_holder(&addr(1)).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn unknown_holder_has_nothing() {
        let ledger = CredentialLedger::new();
        assert_eq!(ledger.holder_count(&addr(7)), 0);
        assert!(ledger.all_by_holder(&addr(7)).is_empty());
        assert!(matches!(
            ledger.by_holder(&addr(7), 0),
            Err(RegistryError::IndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn index_past_end_reports_count() {
        let mut ledger = CredentialLedger::new();
        let c = cred(&ledger, addr(1));
        ledger.push(c);
        assert!(matches!(
            ledger.by_holder(&addr(1), 5),
            Err(RegistryError::IndexOutOfRange { index: 5, count: 1 })
        ));
    }

    #[test]
    fn get_unknown_is_not_found() {
        let ledger = CredentialLedger::new();
        assert!(matches!(
            ledger.get(3),
            Err(RegistryError::NotFound { entity: Entity::Credential, id: 3 })
        ));
    }
}
