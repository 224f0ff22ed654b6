//! Output enum for command execution results
//!
//! Every command produces exactly one output shape; the mapping is
//! documented on each [`MapCommand`](crate::MapCommand) variant and is
//! deterministic: the same command always yields the same variant, only
//! the values differ with state.

use lockstep_core::{
    CommitResult, Error, Key, PrepareResult, Result, RollbackResult, UpdateResult, Versioned,
};
use serde::{Deserialize, Serialize};

/// Successful command execution results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    /// No return value (clear, listener ops, session expiry)
    Unit,

    /// Boolean result (is_empty, contains_*)
    Bool(bool),

    /// Unsigned count (size)
    Uint(u64),

    /// Global version (begin)
    Version(u64),

    /// Optional versioned value (get)
    Maybe(Option<Versioned>),

    /// Versioned value, always present (get_or_default)
    Versioned(Versioned),

    /// Key snapshot (key_set)
    Keys(Vec<Key>),

    /// Value snapshot (values)
    Values(Vec<Versioned>),

    /// Entry snapshot (entry_set, get_all_present)
    Entries(Vec<(Key, Versioned)>),

    /// Single-key mutation result
    Update(UpdateResult),

    /// Prepare result (prepare, prepare_and_commit)
    Prepare(PrepareResult),

    /// Commit result
    Commit(CommitResult),

    /// Rollback result
    Rollback(RollbackResult),
}

impl Output {
    /// Serialize to MessagePack bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        rmp_serde::to_vec(self).expect("output serialization should not fail")
    }

    /// Deserialize from MessagePack bytes (the proxy-side inverse)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::MalformedCommand(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{Timestamp, UpdateStatus};

    #[test]
    fn test_wire_roundtrip() {
        let outputs = vec![
            Output::Unit,
            Output::Bool(true),
            Output::Uint(3),
            Output::Maybe(None),
            Output::Maybe(Some(Versioned::new(vec![1], 2, Timestamp::from_millis(3)))),
            Output::Update(UpdateResult {
                status: UpdateStatus::PreconditionFailed,
                key: Key::from("k"),
                old: None,
                new: None,
            }),
            Output::Prepare(PrepareResult::OptimisticLockFailure),
            Output::Commit(CommitResult::Ok),
            Output::Rollback(RollbackResult::UnknownTransactionId),
        ];
        for output in outputs {
            let bytes = output.to_bytes();
            assert_eq!(Output::from_bytes(&bytes).unwrap(), output);
        }
    }
}
