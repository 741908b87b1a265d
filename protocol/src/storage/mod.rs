//! # Storage Module
//!
//! Content-addressed blob storage for sealed credential records. The
//! registry never holds credential payloads; it holds a [`ContentHash`],
//! and this module turns that hash back into bytes.
//!
//! ## Architecture
//!
//! ```text
//! cas.rs    : ContentHash (CIDv0), StoreError, the ContentStore trait
//! memory.rs : DashMap-backed store for tests and embedded use
//! disk.rs   : sled-backed store behind the node's blob endpoint
//! http.rs   : reqwest client for any server speaking the blob interface
//! ```
//!
//! Every backend verifies fetched bytes against the requested hash, so a
//! caller that got `Ok(bytes)` from `fetch(h)` knows `ContentHash::of(bytes)
//! == h` regardless of which backend answered.

pub mod cas;
pub mod disk;
pub mod http;
pub mod memory;

pub use cas::{ContentHash, ContentStore, StoreError};
pub use disk::SledStore;
pub use http::{HttpStore, HttpStoreConfig};
pub use memory::MemoryStore;
