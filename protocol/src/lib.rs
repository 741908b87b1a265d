// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # CredVault Protocol Core Library
//!
//! The building blocks under the credential registry: how documents are
//! sealed to a holder, how participants are named, and where the sealed
//! bytes live.
//!
//! CredVault keeps credential payloads off the ledger. The registry stores a
//! content hash; the content lives in a content-addressable store, encrypted
//! so that only the holder can read it. This crate is everything on the
//! "off the ledger" side of that line.
//!
//! ## Architecture
//!
//! - **crypto**: X25519 + AES-256-GCM sealed records, Ed25519 call signing,
//!   hashing. Don't roll your own.
//! - **identity**: Bech32 participant addresses with the `cred` prefix.
//! - **storage**: CIDv0 content hashes and the `ContentStore` backends
//!   (memory, sled, HTTP).
//! - **config**: Protocol constants and defaults.
//!
//! ## Design Philosophy
//!
//! 1. The holder's secret key is the only thing that opens a record.
//! 2. A content hash names exactly one byte string, and every backend checks.
//! 3. No unsafe code in crypto paths.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod storage;
