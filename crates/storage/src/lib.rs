//! Storage layer for the lockstep map state machine
//!
//! This crate owns the primary key → entry mapping and the TTL index that
//! drives deterministic expiration:
//! - MapEntry: the per-key record (value, version, creation time, TTL)
//! - EntryStore: ordered entry map; every write keeps the TTL index in sync
//! - TtlIndex: entries ordered by (expiry, key) for deterministic drains
//!
//! All containers are BTree-based. Iteration order is part of the replicated
//! contract, not an implementation detail.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod store;
pub mod ttl;

pub use entry::MapEntry;
pub use store::EntryStore;
pub use ttl::TtlIndex;
