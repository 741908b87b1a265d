//! # CredVault Contracts
//!
//! The credential registry and the pipeline that feeds it:
//!
//! - **Roles**: owner and issuer capabilities. Only the owner adds issuers.
//! - **Catalog**: issuer-defined credential types.
//! - **Ledger**: issued credentials, indexed by holder. Each credential
//!   points at a sealed document by content hash; the document itself never
//!   touches the ledger.
//! - **Registry**: the caller-checked operations over all three, the event
//!   stream, and the shared, lock-guarded handle.
//! - **Journal**: sled-backed event log the registry is rebuilt from.
//! - **Issuance**: seal, publish, record; and the reverse.
//!
//! ## Design Principles
//!
//! 1. The caller is always an explicit argument. Nothing reads ambient
//!    identity.
//! 2. Records are append-only. No update, no delete, no revocation.
//! 3. Ids are dense counters starting at 0 and are never reused.
//! 4. A failed operation changes nothing.

pub mod catalog;
pub mod issuance;
pub mod journal;
pub mod ledger;
pub mod registry;
pub mod roles;

pub use catalog::CredentialType;
pub use issuance::{IssuanceError, Orchestrator, RetryPolicy};
pub use journal::{JournalEntry, JournalError, RegistryJournal};
pub use ledger::Credential;
pub use registry::{CredentialRegistry, Entity, RegistryError, RegistryEvent, SharedRegistry};
pub use roles::Capability;
