//! Transaction layer for the lockstep map state machine
//!
//! This crate implements optimistic two-phase commit over the entry store:
//! - MapUpdate / TransactionLog: the client's proposed update set, each
//!   update carrying its expected-version precondition
//! - TransactionRecord: per-transaction lifecycle state machine
//! - LockTable: per-key exclusive locks held by prepared transactions
//! - TransactionManager: begin / prepare / commit / rollback orchestration
//!
//! Commands apply serially (one state machine, one thread), so "locking"
//! here is pure bookkeeping across commands, not mutual exclusion within
//! one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod locks;
pub mod manager;
pub mod transaction;

pub use locks::LockTable;
pub use manager::TransactionManager;
pub use transaction::{MapUpdate, TransactionLog, TransactionRecord, TransactionState};
