//! Client-visible operation outcomes
//!
//! Each command maps to exactly one of these result shapes. Outcomes that
//! would be exceptions in a thrown-error design (a failed precondition, a
//! write against a locked key, an unknown transaction id) are ordinary
//! values here so the state machine never raises for client mistakes.

use crate::types::Key;
use crate::versioned::Versioned;
use serde::{Deserialize, Serialize};

/// Status of a single-key mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    /// The mutation took effect and minted a new version
    Ok,
    /// Nothing to do (e.g. `put_if_absent` on a present key, `remove` of an
    /// absent key); state untouched
    Noop,
    /// The key is write-locked by a prepared transaction
    WriteLock,
    /// A value or version precondition did not hold; state untouched
    PreconditionFailed,
}

/// Result of a single-key mutation
///
/// Carries the versioned values on both sides of the (attempted) transition.
/// For non-effects (`Noop`, `PreconditionFailed`) the current value, if any,
/// is reported in `old` and `new` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Outcome classification
    pub status: UpdateStatus,
    /// The key the command targeted
    pub key: Key,
    /// Value before the mutation (or the current value for non-effects)
    pub old: Option<Versioned>,
    /// Value after the mutation
    pub new: Option<Versioned>,
}

impl UpdateResult {
    /// A mutation that took effect
    pub fn ok(key: Key, old: Option<Versioned>, new: Option<Versioned>) -> Self {
        UpdateResult {
            status: UpdateStatus::Ok,
            key,
            old,
            new,
        }
    }

    /// A mutation with nothing to do
    pub fn noop(key: Key, current: Option<Versioned>) -> Self {
        UpdateResult {
            status: UpdateStatus::Noop,
            key,
            old: current,
            new: None,
        }
    }

    /// A mutation rejected because the key is locked by a prepared transaction
    pub fn write_lock(key: Key) -> Self {
        UpdateResult {
            status: UpdateStatus::WriteLock,
            key,
            old: None,
            new: None,
        }
    }

    /// A conditional mutation whose predicate failed
    pub fn precondition_failed(key: Key, current: Option<Versioned>) -> Self {
        UpdateResult {
            status: UpdateStatus::PreconditionFailed,
            key,
            old: current,
            new: None,
        }
    }

    /// Did the mutation take effect?
    pub fn succeeded(&self) -> bool {
        self.status == UpdateStatus::Ok
    }
}

/// Result of a transaction prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareResult {
    /// All updates validated and staged; locks held
    Ok,
    /// Some target key is locked by a different prepared transaction
    ConcurrentTransaction,
    /// An expected-version precondition did not match the current version
    OptimisticLockFailure,
    /// Reserved for multi-partition prepares; never produced by this core
    PartialFailure,
}

/// Result of a transaction commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitResult {
    /// Staged updates applied, locks released, record erased
    Ok,
    /// No transaction with that id
    UnknownTransactionId,
    /// Transaction exists but is not prepared; nothing applied
    FailureDuringCommit,
}

/// Result of a transaction rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackResult {
    /// Locks released, staged updates discarded, record erased
    Ok,
    /// No transaction with that id
    UnknownTransactionId,
}
