//! # Identity & Role Table
//!
//! Who may do what in the registry. There are exactly two capabilities:
//!
//! | Capability | Held by                 | Grants                          |
//! |------------|-------------------------|---------------------------------|
//! | `Owner`    | the registry creator    | adding issuers                  |
//! | `Issuer`   | addresses the owner adds | defining types, issuing credentials |
//!
//! The owner is not implicitly an issuer. An owner that wants to issue adds
//! itself like anyone else.
//!
//! Issuer membership only grows. There is no removal, so a credential type
//! created by an issuer stays attributable to an address that held the
//! capability when it was created.

use std::collections::BTreeSet;

use credvault_protocol::identity::Address;
use serde::{Deserialize, Serialize};

/// A permission checked before a registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// May add issuers.
    Owner,
    /// May define credential types and issue credentials of its own types.
    Issuer,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Owner => write!(f, "owner"),
            Capability::Issuer => write!(f, "issuer"),
        }
    }
}

/// Capability assignments for one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    owner: Address,
    issuers: BTreeSet<Address>,
}

impl RoleTable {
    /// A table where `owner` holds [`Capability::Owner`] and nobody is an
    /// issuer yet.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            issuers: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Capability-set lookup backing every permission check.
    pub fn has_capability(&self, addr: &Address, capability: Capability) -> bool {
        match capability {
            Capability::Owner => *addr == self.owner,
            Capability::Issuer => self.issuers.contains(addr),
        }
    }

    pub fn is_issuer(&self, addr: &Address) -> bool {
        self.has_capability(addr, Capability::Issuer)
    }

    /// Grant [`Capability::Issuer`]. Returns `true` if `addr` was not an
    /// issuer before.
    ///
    /// Permission is the caller's concern; the registry checks the owner
    /// capability before getting here.
    pub(crate) fn insert_issuer(&mut self, addr: Address) -> bool {
        self.issuers.insert(addr)
    }

    /// All issuers, in address order.
    pub fn issuers(&self) -> impl Iterator<Item = &Address> {
        self.issuers.iter()
    }

    pub fn issuer_count(&self) -> usize {
        self.issuers.len()
    }
}
