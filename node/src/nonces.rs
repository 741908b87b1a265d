//! # Call Nonces
//!
//! Replay protection for signed registry calls. Every [`SignedCall`]
//! carries a nonce under the caller's signature, and the node accepts a
//! call only if its nonce is strictly above the last one it accepted from
//! the same caller. A captured call therefore works once.
//!
//! Callers pick their own nonces: a counter, or a millisecond timestamp.
//! Gaps are fine; going backwards is not.
//!
//! ## Tree Layout
//!
//! | Tree          | Key                 | Value             |
//! |---------------|---------------------|-------------------|
//! | `call_nonces` | address key hash    | last nonce (8B BE) |
//!
//! The tree lives in the node database next to the journal, so a restart
//! does not reopen the replay window.
//!
//! [`SignedCall`]: crate::api::SignedCall

use credvault_protocol::identity::Address;
use sled::{Db, Tree};

const NONCE_TREE: &str = "call_nonces";

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    /// The nonce is not above the last one accepted from this caller.
    #[error("stale nonce {nonce} for {caller}: last accepted is {last}")]
    Stale {
        caller: Address,
        nonce: u64,
        last: u64,
    },

    #[error("nonce storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("corrupt nonce entry for {0}")]
    Corrupt(Address),
}

/// Highest accepted nonce per caller.
#[derive(Debug, Clone)]
pub struct NonceLedger {
    tree: Tree,
}

impl NonceLedger {
    /// Use the nonce tree of an already open database.
    pub fn from_db(db: &Db) -> Result<Self, NonceError> {
        Ok(Self {
            tree: db.open_tree(NONCE_TREE)?,
        })
    }

    /// A ledger that is deleted when dropped. For tests.
    #[cfg(test)]
    pub fn open_temporary() -> Result<Self, NonceError> {
        Self::from_db(&sled::Config::new().temporary(true).open()?)
    }

    /// The last nonce accepted from `caller`, if any.
    pub fn last(&self, caller: &Address) -> Result<Option<u64>, NonceError> {
        self.tree
            .get(caller.key_hash())?
            .map(|bytes| decode(caller, &bytes))
            .transpose()
    }

    /// Accept `nonce` for `caller` if it is above the last accepted one,
    /// and record it. Concurrent calls from one caller race on a
    /// compare-and-swap, so each nonce is accepted at most once.
    pub async fn consume(&self, caller: &Address, nonce: u64) -> Result<(), NonceError> {
        let key = caller.key_hash();
        loop {
            let current = self.tree.get(key)?;
            if let Some(bytes) = &current {
                let last = decode(caller, bytes)?;
                if nonce <= last {
                    return Err(NonceError::Stale {
                        caller: *caller,
                        nonce,
                        last,
                    });
                }
            }
            let swapped = self
                .tree
                .compare_and_swap(key, current, Some(&nonce.to_be_bytes()[..]))?;
            if swapped.is_ok() {
                break;
            }
        }
        self.tree.flush_async().await?;
        tracing::debug!(%caller, nonce, "call nonce accepted");
        Ok(())
    }
}

fn decode(caller: &Address, bytes: &[u8]) -> Result<u64, NonceError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| NonceError::Corrupt(*caller))?;
    Ok(u64::from_be_bytes(raw))
}
