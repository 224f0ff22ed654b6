//! Transaction records and update sets

use lockstep_core::{Key, SessionId, TransactionId};
use serde::{Deserialize, Serialize};

/// One tentative update inside a transaction
///
/// `expected_version` follows the store's convention: `Some(0)` asserts the
/// key is absent (the counter never mints 0), `None` skips the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapUpdate {
    /// Write `key` to `value` at commit
    Put {
        /// Target key
        key: Key,
        /// New payload
        value: Vec<u8>,
        /// Precondition on the key's current version, if any
        expected_version: Option<u64>,
    },

    /// Delete `key` at commit
    Remove {
        /// Target key
        key: Key,
        /// Precondition on the key's current version, if any
        expected_version: Option<u64>,
    },

    /// Assert `key` is still at `expected_version` and hold its lock
    /// through commit without writing (a read-your-write assertion)
    Lock {
        /// Target key
        key: Key,
        /// Version the transaction read
        expected_version: u64,
    },
}

impl MapUpdate {
    /// The key this update targets
    pub fn key(&self) -> &Key {
        match self {
            MapUpdate::Put { key, .. } => key,
            MapUpdate::Remove { key, .. } => key,
            MapUpdate::Lock { key, .. } => key,
        }
    }

    /// The expected-version precondition, if this update carries one
    pub fn expected_version(&self) -> Option<u64> {
        match self {
            MapUpdate::Put {
                expected_version, ..
            } => *expected_version,
            MapUpdate::Remove {
                expected_version, ..
            } => *expected_version,
            MapUpdate::Lock {
                expected_version, ..
            } => Some(*expected_version),
        }
    }
}

/// The update set a client proposes to apply atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog {
    /// Transaction this log belongs to
    pub transaction_id: TransactionId,
    /// Global version the client observed when it started
    pub version: u64,
    /// Updates in client order; validation and lock acquisition follow
    /// this order, and the first failing precondition wins
    pub updates: Vec<MapUpdate>,
}

/// Lifecycle state of a transaction
///
/// ```text
///         begin                     prepare (OK)           commit
///   ∅ ──────────▶ Active ──────────▶ Prepared ──────────▶ Committed ──▶ ∅
///         │                             │
///         │          prepare (conflict) │ rollback
///         └────────────────────────────▶ RolledBack ────▶ ∅
/// ```
///
/// `Committed` and `RolledBack` are transient: the record is erased in the
/// same command that reaches them, so only `Active` and `Prepared` are ever
/// observable (or snapshotted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    /// Registered, no updates staged
    Active,
    /// All locks held, updates staged, awaiting commit or rollback
    Prepared,
    /// Staged updates applied (transient)
    Committed,
    /// Staging discarded (transient)
    RolledBack,
}

/// Per-transaction record held by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction id (client-chosen)
    pub id: TransactionId,
    /// Session that owns this transaction
    pub session: SessionId,
    /// Lifecycle state
    pub state: TransactionState,
    /// Global version issued at begin (or carried by the first prepare)
    pub start_version: u64,
    /// Updates staged by a successful prepare, in log order
    pub prepared: Vec<MapUpdate>,
}

impl TransactionRecord {
    /// A freshly begun transaction with nothing staged
    pub fn active(id: TransactionId, session: SessionId, start_version: u64) -> Self {
        TransactionRecord {
            id,
            session,
            state: TransactionState::Active,
            start_version,
            prepared: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_accessors() {
        let put = MapUpdate::Put {
            key: Key::from("a"),
            value: vec![1],
            expected_version: Some(3),
        };
        assert_eq!(put.key(), &Key::from("a"));
        assert_eq!(put.expected_version(), Some(3));

        let remove = MapUpdate::Remove {
            key: Key::from("b"),
            expected_version: None,
        };
        assert_eq!(remove.expected_version(), None);

        let lock = MapUpdate::Lock {
            key: Key::from("c"),
            expected_version: 9,
        };
        assert_eq!(lock.expected_version(), Some(9));
    }

    #[test]
    fn test_active_record_has_empty_staging() {
        let record = TransactionRecord::active(TransactionId::new(1), SessionId::new(2), 7);
        assert_eq!(record.state, TransactionState::Active);
        assert_eq!(record.start_version, 7);
        assert!(record.prepared.is_empty());
    }
}
