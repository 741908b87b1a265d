//! # Credential Type Catalog
//!
//! Credential types are the issuer-defined kinds of credential
//! ("VaccineABC", "UniversityDegree", ...). Each records the issuer that
//! created it, and only that issuer can issue credentials of the type.
//!
//! Ids are dense: the n-th type ever created has id n, starting at 0.
//! Nothing is ever removed, so an id is also an index.

use credvault_protocol::config::MAX_CREDENTIAL_TYPE_NAME_LEN;
use credvault_protocol::identity::Address;
use serde::{Deserialize, Serialize};

use crate::registry::{Entity, RegistryError};

/// A credential type definition. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialType {
    pub id: u64,
    /// The issuer that created this type and the only one allowed to issue it.
    pub issuer: Address,
    pub name: String,
}

/// Check a credential type name against the length cap.
///
/// Names are opaque: any string of at most [`MAX_CREDENTIAL_TYPE_NAME_LEN`]
/// bytes is stored exactly as given, the empty string and surrounding
/// whitespace included.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.len() > MAX_CREDENTIAL_TYPE_NAME_LEN {
        return Err(RegistryError::InvalidName(format!(
            "name is {} bytes, limit is {MAX_CREDENTIAL_TYPE_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct CredentialTypeCatalog {
    types: Vec<CredentialType>,
}

impl CredentialTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next created type will get.
    pub fn next_id(&self) -> u64 {
        self.types.len() as u64
    }

    pub fn len(&self) -> u64 {
        self.types.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: u64) -> Result<&CredentialType, RegistryError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.types.get(idx))
            .ok_or(RegistryError::NotFound {
                entity: Entity::CredentialType,
                id,
            })
    }

    /// Append a type. The caller has already validated the issuer, the
    /// name, and that `ty.id == self.next_id()`.
    pub(crate) fn push(&mut self, ty: CredentialType) {
        debug_assert_eq!(ty.id, self.next_id());
        self.types.push(ty);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CredentialType> {
        self.types.iter()
    }
}
