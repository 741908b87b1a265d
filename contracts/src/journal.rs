//! # Registry Journal
//!
//! The on-disk record of every committed registry mutation, built on
//! sled. A registry that opens its journal replays it and ends up exactly
//! where it left off, ids included.
//!
//! ## Tree Layout
//!
//! | Tree       | Key              | Value                  |
//! |------------|------------------|------------------------|
//! | `journal`  | `seq` (8B BE)    | `bincode(JournalEntry)` |
//! | `metadata` | key (UTF-8)      | value (bytes)          |
//!
//! Sequence numbers are stored big-endian so sled's lexicographic order is
//! numeric order, and iterating the tree replays events in commit order.
//!
//! The journal is append-only. Nothing here rewrites or deletes entries.

use std::path::Path;
#[cfg(test)]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use credvault_protocol::identity::Address;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::registry::RegistryEvent;

/// Errors from journal I/O and replay validation.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The journal was created for a different registry owner.
    #[error("journal belongs to owner {stored}, not {requested}")]
    OwnerMismatch { stored: String, requested: String },

    /// The journal holds an event sequence no registry could have produced.
    #[error("inconsistent journal: {0}")]
    Inconsistent(String),
}

pub type JournalResult<T> = Result<T, JournalError>;

const JOURNAL_TREE: &str = "journal";
const METADATA_TREE: &str = "metadata";
const META_OWNER: &[u8] = b"owner";

/// One journaled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, from 0.
    pub seq: u64,
    /// Wall-clock time the event was committed.
    pub recorded_at: DateTime<Utc>,
    pub event: RegistryEvent,
}

/// Append-only event log for one registry.
///
/// Appends come from inside the registry's write lock, so there is at most
/// one writer and `next_seq` needs no synchronization of its own.
#[derive(Debug, Clone)]
pub struct RegistryJournal {
    db: Db,
    entries: Tree,
    metadata: Tree,
    /// Flushes left to fail before the disk is used again.
    #[cfg(test)]
    failing_flushes: Arc<AtomicUsize>,
}

impl RegistryJournal {
    /// Open or create a journal at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> JournalResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A journal that is deleted when dropped. For tests.
    pub fn open_temporary() -> JournalResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    /// Use the journal trees of an already open database.
    pub fn from_db(db: Db) -> JournalResult<Self> {
        let entries = db.open_tree(JOURNAL_TREE)?;
        let metadata = db.open_tree(METADATA_TREE)?;
        Ok(Self {
            db,
            entries,
            metadata,
            #[cfg(test)]
            failing_flushes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Make the next `n` flushes fail. Clones share the counter.
    #[cfg(test)]
    pub(crate) fn fail_next_flushes(&self, n: usize) {
        self.failing_flushes.store(n, Ordering::SeqCst);
    }

    fn flush(&self) -> JournalResult<()> {
        #[cfg(test)]
        {
            let injected = self
                .failing_flushes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(JournalError::Sled(sled::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "injected flush failure",
                ))));
            }
        }
        self.db.flush()?;
        Ok(())
    }

    /// The owner this journal was created for, if it has been bound.
    pub fn owner(&self) -> JournalResult<Option<Address>> {
        match self.metadata.get(META_OWNER)? {
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| JournalError::Serialization(e.to_string()))?;
                let owner = Address::parse(text)
                    .map_err(|e| JournalError::Serialization(e.to_string()))?;
                Ok(Some(owner))
            }
            None => Ok(None),
        }
    }

    /// Record `owner` on first use; afterwards, check it matches.
    pub fn bind_owner(&self, owner: &Address) -> JournalResult<()> {
        match self.owner()? {
            Some(stored) if stored == *owner => Ok(()),
            Some(stored) => Err(JournalError::OwnerMismatch {
                stored: stored.to_string(),
                requested: owner.to_string(),
            }),
            None => {
                self.metadata
                    .insert(META_OWNER, owner.to_string().as_bytes())?;
                self.flush()
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_seq(&self) -> JournalResult<u64> {
        match self.entries.last()? {
            Some((key, _)) => {
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    JournalError::Inconsistent(format!("journal key of {} bytes", key.len()))
                })?;
                Ok(u64::from_be_bytes(bytes) + 1)
            }
            None => Ok(0),
        }
    }

    /// Durably append `event`, returning its sequence number.
    ///
    /// Returns only after the entry is flushed, so an event the registry
    /// has applied is never lost to a crash. On error the entry is gone
    /// again: the journal holds exactly the events the registry applied.
    pub fn append(&self, event: &RegistryEvent) -> JournalResult<u64> {
        let seq = self.next_seq()?;
        let entry = JournalEntry {
            seq,
            recorded_at: Utc::now(),
            event: event.clone(),
        };
        let bytes =
            bincode::serialize(&entry).map_err(|e| JournalError::Serialization(e.to_string()))?;
        let key = seq.to_be_bytes();
        self.entries.insert(key, bytes)?;
        if let Err(e) = self.flush() {
            tracing::error!(seq, error = %e, "journal flush failed, dropping entry");
            self.entries.remove(key)?;
            return Err(e);
        }
        tracing::debug!(seq, "journal entry appended");
        Ok(seq)
    }

    /// Every entry, in commit order.
    pub fn entries(&self) -> JournalResult<Vec<JournalEntry>> {
        let mut out = Vec::with_capacity(self.entries.len());
        for (expected, item) in self.entries.iter().enumerate() {
            let (_, value) = item?;
            let entry: JournalEntry = bincode::deserialize(&value)
                .map_err(|e| JournalError::Serialization(e.to_string()))?;
            if entry.seq != expected as u64 {
                return Err(JournalError::Inconsistent(format!(
                    "entry {} found at position {expected}",
                    entry.seq
                )));
            }
            out.push(entry);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_key_hash([n; 32])
    }

    #[test]
    fn append_assigns_sequential_seqs() {
        let journal = RegistryJournal::open_temporary().unwrap();
        let e = RegistryEvent::IssuerAdded { issuer: addr(1) };
        assert_eq!(journal.append(&e).unwrap(), 0);
        assert_eq!(journal.append(&e).unwrap(), 1);
        assert_eq!(journal.len(), 2);

        let entries = journal.entries().unwrap();
        assert_eq!(entries[1].seq, 1);
        assert_eq!(entries[0].event, e);
    }

    #[test]
    fn owner_binding() {
        let journal = RegistryJournal::open_temporary().unwrap();
        assert_eq!(journal.owner().unwrap(), None);
        journal.bind_owner(&addr(1)).unwrap();
        journal.bind_owner(&addr(1)).unwrap();
        assert_eq!(journal.owner().unwrap(), Some(addr(1)));
        assert!(matches!(
            journal.bind_owner(&addr(2)),
            Err(JournalError::OwnerMismatch { .. })
        ));
    }

    #[test]
    fn failed_flush_leaves_no_entry() {
        let journal = RegistryJournal::open_temporary().unwrap();
        let first = RegistryEvent::IssuerAdded { issuer: addr(1) };
        let second = RegistryEvent::IssuerAdded { issuer: addr(2) };

        journal.fail_next_flushes(1);
        assert!(matches!(journal.append(&first), Err(JournalError::Sled(_))));
        assert!(journal.is_empty());

        assert_eq!(journal.append(&second).unwrap(), 0);
        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, second);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = RegistryJournal::open(dir.path()).unwrap();
            journal
                .append(&RegistryEvent::IssuerAdded { issuer: addr(3) })
                .unwrap();
        }
        let journal = RegistryJournal::open(dir.path()).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.append(&RegistryEvent::IssuerAdded { issuer: addr(4) }).unwrap(), 1);
    }
}
