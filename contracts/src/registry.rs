//! # Credential Registry Contract
//!
//! The permissioned, append-only ledger of issuers, credential types, and
//! issued credentials. It composes the [`RoleTable`], the
//! [`CredentialTypeCatalog`], and the [`CredentialLedger`] behind one set of
//! caller-checked operations.
//!
//! ## Mutation Path
//!
//! Every successful mutation follows the same four steps:
//!
//! ```text
//! validate (caller capability, ids, name)
//!   -> build RegistryEvent
//!   -> append to journal (if attached)       failure aborts, nothing changed
//!   -> apply event to in-memory state
//!   -> broadcast event (if anyone listens)
//! ```
//!
//! Applying is the same code the journal replay runs, so a registry rebuilt
//! from its journal is the registry that wrote it.
//!
//! ## Concurrency
//!
//! [`CredentialRegistry`] is a plain state machine. [`SharedRegistry`] puts
//! it behind a `parking_lot::RwLock`: mutations take the write lock for one
//! local step and are therefore totally ordered; reads share the lock.
//! Async code mutates through [`SharedRegistry::with_write`], which moves
//! the journal fsync onto the blocking pool.

use std::sync::Arc;

use credvault_protocol::identity::Address;
use credvault_protocol::storage::ContentHash;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::catalog::{validate_name, CredentialType, CredentialTypeCatalog};
use crate::journal::{JournalError, RegistryJournal};
use crate::ledger::{Credential, CredentialLedger};
use crate::roles::{Capability, RoleTable};

/// How many unread events a slow subscriber may fall behind by before it
/// starts missing them.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Kinds of registry record, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    CredentialType,
    Credential,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::CredentialType => write!(f, "credential type"),
            Entity::Credential => write!(f, "credential"),
        }
    }
}

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The caller lacks the capability the operation requires.
    #[error("permission denied: {caller} cannot {action}")]
    PermissionDenied {
        /// Who tried.
        caller: Address,
        /// What they tried to do.
        action: &'static str,
    },

    /// The referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },

    /// A holder-relative index past the end of the holder's credentials.
    #[error("index {index} out of range: holder has {count} credentials")]
    IndexOutOfRange { index: u64, count: u64 },

    /// A credential type name failed validation.
    #[error("invalid credential type name: {0}")]
    InvalidName(String),

    /// The journal could not be written or replayed. No state changed.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// A mutation handed to the blocking pool never ran to completion,
    /// because the runtime is shutting down.
    #[error("registry task interrupted: {0}")]
    Interrupted(String),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A committed registry mutation.
///
/// Events are the unit of persistence: the journal is a sequence of these,
/// and replaying them in order reproduces the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    IssuerAdded {
        issuer: Address,
    },
    CredentialTypeAdded {
        id: u64,
        issuer: Address,
        name: String,
    },
    CredentialIssued {
        id: u64,
        credential_type_id: u64,
        holder: Address,
        content_hash: ContentHash,
    },
}

// ---------------------------------------------------------------------------
// CredentialRegistry
// ---------------------------------------------------------------------------

/// The registry state machine.
#[derive(Debug)]
pub struct CredentialRegistry {
    roles: RoleTable,
    catalog: CredentialTypeCatalog,
    ledger: CredentialLedger,
    journal: Option<RegistryJournal>,
    events: Option<broadcast::Sender<RegistryEvent>>,
}

impl CredentialRegistry {
    /// An empty, in-memory registry owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self {
            roles: RoleTable::new(owner),
            catalog: CredentialTypeCatalog::new(),
            ledger: CredentialLedger::new(),
            journal: None,
            events: None,
        }
    }

    /// Rebuild a registry by applying `events` in order.
    ///
    /// Fails if the sequence could not have been produced by a registry
    /// owned by `owner`: an id out of sequence, a type created by an
    /// address that was not an issuer at the time, or a credential of an
    /// unknown type. `CredentialIssued` does not name its issuer, so who
    /// issued a credential is checked when it is committed, not on replay.
    pub fn replay<I>(owner: Address, events: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = RegistryEvent>,
    {
        let mut registry = Self::new(owner);
        for event in events {
            registry.check_replayable(&event)?;
            registry.apply(&event);
        }
        Ok(registry)
    }

    /// Open a journal-backed registry: replay what the journal holds, then
    /// keep appending to it.
    ///
    /// The journal remembers its owner; opening it for a different owner
    /// fails with [`JournalError::OwnerMismatch`].
    pub fn open(owner: Address, journal: RegistryJournal) -> Result<Self, RegistryError> {
        journal.bind_owner(&owner)?;
        let events = journal
            .entries()?
            .into_iter()
            .map(|entry| entry.event);
        let mut registry = Self::replay(owner, events)?;
        info!(
            owner = %owner,
            issuers = registry.roles.issuer_count(),
            credential_types = registry.catalog.len(),
            credentials = registry.ledger.len(),
            "registry restored from journal"
        );
        registry.journal = Some(journal);
        Ok(registry)
    }

    // -- Roles ------------------------------------------------------------

    pub fn owner(&self) -> &Address {
        self.roles.owner()
    }

    pub fn has_capability(&self, addr: &Address, capability: Capability) -> bool {
        self.roles.has_capability(addr, capability)
    }

    pub fn is_issuer(&self, addr: &Address) -> bool {
        self.roles.is_issuer(addr)
    }

    pub fn issuers(&self) -> Vec<Address> {
        self.roles.issuers().copied().collect()
    }

    /// Grant issuer capability to `issuer`. Owner only.
    ///
    /// Returns `true` if the address was newly added. Adding an existing
    /// issuer again is a no-op that returns `false` and records nothing.
    pub fn add_issuer(&mut self, caller: &Address, issuer: Address) -> Result<bool, RegistryError> {
        self.require(caller, Capability::Owner, "add issuers")?;
        if self.roles.is_issuer(&issuer) {
            return Ok(false);
        }
        self.commit(RegistryEvent::IssuerAdded { issuer })?;
        Ok(true)
    }

    // -- Catalog ----------------------------------------------------------

    /// Define a new credential type owned by `caller`. Issuer only.
    pub fn add_credential_type(&mut self, caller: &Address, name: &str) -> Result<u64, RegistryError> {
        self.require(caller, Capability::Issuer, "add credential types")?;
        validate_name(name)?;
        let id = self.catalog.next_id();
        self.commit(RegistryEvent::CredentialTypeAdded {
            id,
            issuer: *caller,
            name: name.to_string(),
        })?;
        Ok(id)
    }

    pub fn get_credential_type(&self, id: u64) -> Result<&CredentialType, RegistryError> {
        self.catalog.get(id)
    }

    pub fn credential_type_count(&self) -> u64 {
        self.catalog.len()
    }

    // -- Ledger -----------------------------------------------------------

    /// Check that `caller` may issue credentials of `credential_type_id`,
    /// without issuing anything.
    pub fn authorize_issue(&self, caller: &Address, credential_type_id: u64) -> Result<(), RegistryError> {
        let ty = self.catalog.get(credential_type_id)?;
        if ty.issuer != *caller {
            return Err(RegistryError::PermissionDenied {
                caller: *caller,
                action: "issue credentials of a type it did not create",
            });
        }
        Ok(())
    }

    /// Record a credential for `holder` referencing a sealed document by
    /// `content_hash`. Only the issuer that created the type may do this.
    pub fn issue_credential(
        &mut self,
        caller: &Address,
        credential_type_id: u64,
        holder: Address,
        content_hash: ContentHash,
    ) -> Result<u64, RegistryError> {
        self.authorize_issue(caller, credential_type_id)?;
        let id = self.ledger.next_id();
        self.commit(RegistryEvent::CredentialIssued {
            id,
            credential_type_id,
            holder,
            content_hash,
        })?;
        Ok(id)
    }

    pub fn get_credential(&self, id: u64) -> Result<&Credential, RegistryError> {
        self.ledger.get(id)
    }

    pub fn get_credentials_by_holder_count(&self, holder: &Address) -> u64 {
        self.ledger.holder_count(holder)
    }

    pub fn get_credential_by_holder(&self, holder: &Address, index: u64) -> Result<&Credential, RegistryError> {
        self.ledger.by_holder(holder, index)
    }

    pub fn credentials_by_holder(&self, holder: &Address) -> Vec<Credential> {
        self.ledger.all_by_holder(holder)
    }

    pub fn credential_count(&self) -> u64 {
        self.ledger.len()
    }

    // -- Internals --------------------------------------------------------

    fn require(&self, caller: &Address, capability: Capability, action: &'static str) -> Result<(), RegistryError> {
        if self.roles.has_capability(caller, capability) {
            Ok(())
        } else {
            Err(RegistryError::PermissionDenied {
                caller: *caller,
                action,
            })
        }
    }

    fn commit(&mut self, event: RegistryEvent) -> Result<(), RegistryError> {
        if let Some(journal) = &self.journal {
            journal.append(&event)?;
        }
        self.apply(&event);
        log_committed(&event);
        if let Some(events) = &self.events {
            // No subscribers is not an error.
            let _ = events.send(event);
        }
        Ok(())
    }

    /// Validation for events coming from a journal rather than a caller.
    fn check_replayable(&self, event: &RegistryEvent) -> Result<(), RegistryError> {
        let inconsistent = |msg: String| RegistryError::Journal(JournalError::Inconsistent(msg));
        match event {
            RegistryEvent::IssuerAdded { .. } => Ok(()),
            RegistryEvent::CredentialTypeAdded { id, issuer, .. } => {
                if *id != self.catalog.next_id() {
                    return Err(inconsistent(format!(
                        "credential type id {id}, expected {}",
                        self.catalog.next_id()
                    )));
                }
                if !self.roles.is_issuer(issuer) {
                    return Err(inconsistent(format!("type {id} created by non-issuer {issuer}")));
                }
                Ok(())
            }
            RegistryEvent::CredentialIssued {
                id,
                credential_type_id,
                ..
            } => {
                if *id != self.ledger.next_id() {
                    return Err(inconsistent(format!(
                        "credential id {id}, expected {}",
                        self.ledger.next_id()
                    )));
                }
                self.catalog
                    .get(*credential_type_id)
                    .map_err(|_| inconsistent(format!("credential {id} references unknown type {credential_type_id}")))?;
                Ok(())
            }
        }
    }

    fn apply(&mut self, event: &RegistryEvent) {
        match event {
            RegistryEvent::IssuerAdded { issuer } => {
                self.roles.insert_issuer(*issuer);
            }
            RegistryEvent::CredentialTypeAdded { id, issuer, name } => {
                self.catalog.push(CredentialType {
                    id: *id,
                    issuer: *issuer,
                    name: name.clone(),
                });
            }
            RegistryEvent::CredentialIssued {
                id,
                credential_type_id,
                holder,
                content_hash,
            } => {
                self.ledger.push(Credential {
                    id: *id,
                    credential_type_id: *credential_type_id,
                    holder: *holder,
                    content_hash: *content_hash,
                });
            }
        }
    }
}

fn log_committed(event: &RegistryEvent) {
    match event {
        RegistryEvent::IssuerAdded { issuer } => {
            info!(issuer = %issuer, "issuer added");
        }
        RegistryEvent::CredentialTypeAdded { id, issuer, name } => {
            info!(id, issuer = %issuer, name = %name, "credential type added");
        }
        RegistryEvent::CredentialIssued {
            id,
            credential_type_id,
            holder,
            content_hash,
        } => {
            info!(
                id,
                credential_type_id,
                holder = %holder,
                content_hash = %content_hash,
                "credential issued"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// SharedRegistry
// ---------------------------------------------------------------------------

/// A [`CredentialRegistry`] shared across tasks.
///
/// Cloning is cheap; clones refer to the same registry. Getters return
/// owned values because the lock is released before they return.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<CredentialRegistry>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl SharedRegistry {
    pub fn new(mut registry: CredentialRegistry) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        registry.events = Some(events.clone());
        Self {
            inner: Arc::new(RwLock::new(registry)),
            events,
        }
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Hold the read lock for several consistent reads.
    pub fn read(&self) -> RwLockReadGuard<'_, CredentialRegistry> {
        self.inner.read()
    }

    pub fn owner(&self) -> Address {
        *self.inner.read().owner()
    }

    /// Run `f` under the write lock on tokio's blocking pool.
    ///
    /// A journaled commit waits for an fsync. Async callers mutate through
    /// here so that wait never parks a runtime worker.
    pub async fn with_write<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut CredentialRegistry) -> Result<T, RegistryError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || f(&mut inner.write())).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(RegistryError::Interrupted(e.to_string())),
        }
    }

    pub fn add_issuer(&self, caller: &Address, issuer: Address) -> Result<bool, RegistryError> {
        self.inner.write().add_issuer(caller, issuer)
    }

    pub fn is_issuer(&self, addr: &Address) -> bool {
        self.inner.read().is_issuer(addr)
    }

    pub fn issuers(&self) -> Vec<Address> {
        self.inner.read().issuers()
    }

    pub fn add_credential_type(&self, caller: &Address, name: &str) -> Result<u64, RegistryError> {
        self.inner.write().add_credential_type(caller, name)
    }

    pub fn get_credential_type(&self, id: u64) -> Result<CredentialType, RegistryError> {
        self.inner.read().get_credential_type(id).cloned()
    }

    pub fn authorize_issue(&self, caller: &Address, credential_type_id: u64) -> Result<(), RegistryError> {
        self.inner.read().authorize_issue(caller, credential_type_id)
    }

    pub fn issue_credential(
        &self,
        caller: &Address,
        credential_type_id: u64,
        holder: Address,
        content_hash: ContentHash,
    ) -> Result<u64, RegistryError> {
        self.inner
            .write()
            .issue_credential(caller, credential_type_id, holder, content_hash)
    }

    pub fn get_credential(&self, id: u64) -> Result<Credential, RegistryError> {
        self.inner.read().get_credential(id).cloned()
    }

    pub fn get_credentials_by_holder_count(&self, holder: &Address) -> u64 {
        self.inner.read().get_credentials_by_holder_count(holder)
    }

    pub fn get_credential_by_holder(&self, holder: &Address, index: u64) -> Result<Credential, RegistryError> {
        self.inner.read().get_credential_by_holder(holder, index).cloned()
    }

    pub fn credentials_by_holder(&self, holder: &Address) -> Vec<Credential> {
        self.inner.read().credentials_by_holder(holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_key_hash([n; 32])
    }

    #[test]
    fn add_issuer_reports_newly_added() {
        let owner = addr(0);
        let mut reg = CredentialRegistry::new(owner);
        assert!(reg.add_issuer(&owner, addr(1)).unwrap());
        assert!(!reg.add_issuer(&owner, addr(1)).unwrap());
        assert_eq!(reg.issuers(), vec![addr(1)]);
    }

    #[test]
    fn failed_mutation_changes_nothing() {
        let owner = addr(0);
        let mut reg = CredentialRegistry::new(owner);
        reg.add_issuer(&owner, addr(1)).unwrap();
        assert!(reg.add_credential_type(&addr(1), &"x".repeat(129)).is_err());
        assert_eq!(reg.credential_type_count(), 0);
        assert!(reg
            .issue_credential(&addr(1), 0, addr(2), ContentHash::of(b"x"))
            .is_err());
        assert_eq!(reg.credential_count(), 0);
    }

    #[test]
    fn replay_reproduces_state() {
        let owner = addr(0);
        let events = vec![
            RegistryEvent::IssuerAdded { issuer: addr(1) },
            RegistryEvent::CredentialTypeAdded { id: 0, issuer: addr(1), name: "T".into() },
            RegistryEvent::CredentialIssued {
                id: 0,
                credential_type_id: 0,
                holder: addr(2),
                content_hash: ContentHash::of(b"blob"),
            },
        ];
        let reg = CredentialRegistry::replay(owner, events).unwrap();
        assert!(reg.is_issuer(&addr(1)));
        assert_eq!(reg.get_credential_type(0).unwrap().name, "T");
        assert_eq!(reg.get_credential_by_holder(&addr(2), 0).unwrap().id, 0);
    }

    #[test]
    fn replay_rejects_out_of_sequence_ids() {
        let events = vec![
            RegistryEvent::IssuerAdded { issuer: addr(1) },
            RegistryEvent::CredentialTypeAdded { id: 4, issuer: addr(1), name: "T".into() },
        ];
        assert!(matches!(
            CredentialRegistry::replay(addr(0), events),
            Err(RegistryError::Journal(JournalError::Inconsistent(_)))
        ));
    }

    #[test]
    fn replay_rejects_type_from_non_issuer() {
        let events = vec![RegistryEvent::CredentialTypeAdded {
            id: 0,
            issuer: addr(5),
            name: "T".into(),
        }];
        assert!(CredentialRegistry::replay(addr(0), events).is_err());
    }

    #[test]
    fn failed_journal_write_keeps_memory_and_disk_in_step() {
        let owner = addr(0);
        let journal = RegistryJournal::open_temporary().unwrap();
        let mut reg = CredentialRegistry::open(owner, journal.clone()).unwrap();
        reg.add_issuer(&owner, addr(1)).unwrap();

        journal.fail_next_flushes(1);
        assert!(matches!(
            reg.add_credential_type(&addr(1), "Lost"),
            Err(RegistryError::Journal(JournalError::Sled(_)))
        ));
        assert_eq!(reg.credential_type_count(), 0);

        assert_eq!(reg.add_credential_type(&addr(1), "Kept").unwrap(), 0);
        assert_eq!(reg.add_credential_type(&addr(1), "Next").unwrap(), 1);

        let reopened = CredentialRegistry::open(owner, journal).unwrap();
        assert_eq!(reopened.credential_type_count(), 2);
        assert_eq!(reopened.get_credential_type(0).unwrap().name, "Kept");
        assert_eq!(reopened.get_credential_type(1).unwrap().name, "Next");
    }

    #[tokio::test]
    async fn async_mutations_run_off_the_runtime_thread() {
        let owner = addr(0);
        let journal = RegistryJournal::open_temporary().unwrap();
        let shared = SharedRegistry::new(CredentialRegistry::open(owner, journal).unwrap());

        let runtime_thread = std::thread::current().id();
        let (added, mutation_thread) = shared
            .with_write(move |reg| Ok((reg.add_issuer(&owner, addr(1))?, std::thread::current().id())))
            .await
            .unwrap();
        assert!(added);
        assert_ne!(mutation_thread, runtime_thread);
        assert!(shared.is_issuer(&addr(1)));

        let err = shared
            .with_write(|reg| reg.add_credential_type(&addr(9), "T"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn subscribers_see_committed_events() {
        let owner = addr(0);
        let shared = SharedRegistry::new(CredentialRegistry::new(owner));
        let mut rx = shared.subscribe();

        shared.add_issuer(&owner, addr(1)).unwrap();
        // Idempotent re-add emits nothing.
        shared.add_issuer(&owner, addr(1)).unwrap();
        shared.add_credential_type(&addr(1), "Degree").unwrap();

        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::IssuerAdded { issuer: addr(1) });
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::CredentialTypeAdded { id: 0, issuer: addr(1), name: "Degree".into() }
        );
        assert!(rx.try_recv().is_err());
    }
}
