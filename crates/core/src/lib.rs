//! Core types for the lockstep map state machine
//!
//! This crate defines the foundational types used throughout the system:
//! - Key: Ordered map key; its `Ord` drives every deterministic iteration
//! - SessionId / TransactionId: Opaque ids minted outside the state machine
//! - Timestamp: Logical time as delivered by the replicated log
//! - Versioned: A value paired with its version and creation time
//! - VersionCounter: The global monotone mutation counter
//! - MapEvent: Change notifications queued for subscribed sessions
//! - Result types: Client-visible outcomes (update, prepare, commit, rollback)
//! - Error: The unified error type for structural failures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod results;
pub mod timestamp;
pub mod types;
pub mod version;
pub mod versioned;

pub use error::{Error, Result};
pub use event::{EventKind, MapEvent};
pub use results::{CommitResult, PrepareResult, RollbackResult, UpdateResult, UpdateStatus};
pub use timestamp::Timestamp;
pub use types::{Key, SessionId, TransactionId};
pub use version::VersionCounter;
pub use versioned::Versioned;
