//! Transaction manager: optimistic two-phase commit
//!
//! ## Prepare sequence
//!
//! ```text
//! 1. Validate every update in log order:
//!    a. key not locked by a different transaction  (else ConcurrentTransaction)
//!    b. expected version == current version        (else OptimisticLockFailure)
//! 2. Acquire write locks on all target keys, same order
//!    (release partial acquisitions on failure)
//! 3. Stage the updates; state → Prepared
//! ```
//!
//! The first failing precondition determines the returned error, and a
//! failed prepare leaves no trace: no locks, no staging, no record change.
//!
//! ## Commit sequence
//!
//! ```text
//! 1. Record must be Prepared (else UnknownTransactionId / FailureDuringCommit)
//! 2. Apply staged updates in order; each Put allocates one version
//! 3. Release all locks; erase the record
//! ```
//!
//! Commands apply serially, so the whole sequence is atomic with respect to
//! every other command.

use crate::locks::LockTable;
use crate::transaction::{MapUpdate, TransactionLog, TransactionRecord, TransactionState};
use lockstep_core::{
    CommitResult, Error, Key, MapEvent, PrepareResult, Result, RollbackResult, SessionId,
    Timestamp, TransactionId, VersionCounter, Versioned,
};
use lockstep_storage::EntryStore;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Manages transaction lifecycle, staging, and the lock table
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransactionManager {
    transactions: BTreeMap<TransactionId, TransactionRecord>,
    locks: LockTable,
}

impl TransactionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        TransactionManager {
            transactions: BTreeMap::new(),
            locks: LockTable::new(),
        }
    }

    // ========== Lifecycle operations ==========

    /// Register an `Active` transaction and return its start version.
    ///
    /// Idempotent: repeating `begin` for a known id returns the version
    /// issued the first time, whatever the record's current state.
    pub fn begin(
        &mut self,
        id: TransactionId,
        session: SessionId,
        current_version: u64,
    ) -> u64 {
        self.transactions
            .entry(id)
            .or_insert_with(|| TransactionRecord::active(id, session, current_version))
            .start_version
    }

    /// Validate and stage a transaction log.
    ///
    /// Creates the record if `begin` was never called for this id. A
    /// re-prepare of an already-`Prepared` id is treated as a retry and
    /// returns `Ok` without staging twice.
    pub fn prepare(
        &mut self,
        log: TransactionLog,
        session: SessionId,
        store: &EntryStore,
    ) -> PrepareResult {
        let id = log.transaction_id;
        if let Some(record) = self.transactions.get(&id) {
            if record.state == TransactionState::Prepared {
                return PrepareResult::Ok;
            }
        }

        // Phase 1: validate in log order; first failure wins.
        for update in &log.updates {
            if self.locks.is_locked_by_other(update.key(), id) {
                return PrepareResult::ConcurrentTransaction;
            }
            if let Some(expected) = update.expected_version() {
                if store.current_version(update.key()) != expected {
                    return PrepareResult::OptimisticLockFailure;
                }
            }
        }

        // Phase 2: acquire locks in the same order, releasing partial
        // acquisitions if a key is contested.
        let mut acquired: Vec<Key> = Vec::with_capacity(log.updates.len());
        for update in &log.updates {
            if self.locks.try_lock(update.key().clone(), id) {
                acquired.push(update.key().clone());
            } else {
                for key in &acquired {
                    self.locks.unlock(key);
                }
                return PrepareResult::ConcurrentTransaction;
            }
        }

        // Phase 3: stage.
        let record = self
            .transactions
            .entry(id)
            .or_insert_with(|| TransactionRecord::active(id, session, log.version));
        record.state = TransactionState::Prepared;
        record.prepared = log.updates;
        debug!(%id, staged = record.prepared.len(), "transaction prepared");
        PrepareResult::Ok
    }

    /// Apply a prepared transaction's staged updates.
    ///
    /// Returns the commit result together with one event per effective
    /// update, in staging order. On any failure result nothing has changed.
    pub fn commit(
        &mut self,
        id: TransactionId,
        store: &mut EntryStore,
        versions: &mut VersionCounter,
        now: Timestamp,
    ) -> (CommitResult, Vec<MapEvent>) {
        let record = match self.transactions.remove(&id) {
            None => return (CommitResult::UnknownTransactionId, Vec::new()),
            Some(record) => record,
        };
        if record.state != TransactionState::Prepared {
            self.transactions.insert(id, record);
            return (CommitResult::FailureDuringCommit, Vec::new());
        }

        let mut events = Vec::with_capacity(record.prepared.len());
        for update in &record.prepared {
            match update {
                MapUpdate::Put { key, value, .. } => {
                    let version = versions.allocate();
                    let new = Versioned::new(value.clone(), version, now);
                    let old = store.apply_write(key.clone(), value.clone(), 0, version, now);
                    events.push(match old {
                        Some(old) => MapEvent::updated(key.clone(), old.into_versioned(), new),
                        None => MapEvent::inserted(key.clone(), new),
                    });
                }
                MapUpdate::Remove { key, .. } => {
                    // An unconditional staged remove of a key that vanished
                    // in the meantime applies as nothing.
                    if let Some(old) = store.apply_remove(key) {
                        events.push(MapEvent::removed(key.clone(), old.into_versioned()));
                    }
                }
                MapUpdate::Lock { .. } => {}
            }
        }

        self.locks.release_owned(id);
        debug!(%id, applied = events.len(), "transaction committed");
        (CommitResult::Ok, events)
    }

    /// Single-command fast path: prepare and, on success, commit.
    pub fn prepare_and_commit(
        &mut self,
        log: TransactionLog,
        session: SessionId,
        store: &mut EntryStore,
        versions: &mut VersionCounter,
        now: Timestamp,
    ) -> (PrepareResult, Vec<MapEvent>) {
        let id = log.transaction_id;
        match self.prepare(log, session, store) {
            PrepareResult::Ok => {
                let (commit_result, events) = self.commit(id, store, versions, now);
                debug_assert_eq!(commit_result, CommitResult::Ok);
                (PrepareResult::Ok, events)
            }
            failure => (failure, Vec::new()),
        }
    }

    /// Release locks and discard staging. Legal from `Active` or `Prepared`.
    pub fn rollback(&mut self, id: TransactionId) -> RollbackResult {
        match self.transactions.remove(&id) {
            None => RollbackResult::UnknownTransactionId,
            Some(_) => {
                self.locks.release_owned(id);
                debug!(%id, "transaction rolled back");
                RollbackResult::Ok
            }
        }
    }

    /// Garbage-collect transactions owned by a closed session.
    ///
    /// `Active` transactions are discarded (nothing is staged, nothing is
    /// locked, and no client can ever reach them again). `Prepared`
    /// transactions are retained with their locks: a prepared participant
    /// may still be committed by a coordinator recovering elsewhere, so
    /// only an explicit commit or rollback releases them.
    pub fn expire_session(&mut self, session: SessionId) -> Vec<TransactionId> {
        let orphaned: Vec<TransactionId> = self
            .transactions
            .values()
            .filter(|record| {
                record.session == session && record.state == TransactionState::Active
            })
            .map(|record| record.id)
            .collect();
        for id in &orphaned {
            self.transactions.remove(id);
        }
        orphaned
    }

    // ========== Introspection ==========

    /// Lock holder for `key`, if any
    pub fn lock_owner(&self, key: &Key) -> Option<TransactionId> {
        self.locks.owner(key)
    }

    /// All locked keys in ascending order
    pub fn locked_keys(&self) -> BTreeSet<Key> {
        self.locks.locked_keys()
    }

    /// In-flight transaction records in ascending id order
    pub fn records(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.transactions.values()
    }

    /// Number of in-flight transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether no transactions are in flight
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    // ========== Snapshot support ==========

    /// Rebuild a manager from snapshotted records, re-deriving the lock
    /// table from `Prepared` records' staged updates.
    pub fn from_records(records: Vec<TransactionRecord>) -> Result<Self> {
        let mut manager = TransactionManager::new();
        for record in records {
            if record.state == TransactionState::Prepared {
                for update in &record.prepared {
                    if !manager.locks.try_lock(update.key().clone(), record.id) {
                        return Err(Error::SnapshotCorrupt(format!(
                            "key {} locked by two prepared transactions",
                            update.key()
                        )));
                    }
                }
            }
            manager.transactions.insert(record.id, record);
        }
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::from(s)
    }

    fn put(key_name: &str, value: &[u8], expected: Option<u64>) -> MapUpdate {
        MapUpdate::Put {
            key: key(key_name),
            value: value.to_vec(),
            expected_version: expected,
        }
    }

    fn log(id: u64, version: u64, updates: Vec<MapUpdate>) -> TransactionLog {
        TransactionLog {
            transaction_id: TransactionId::new(id),
            version,
            updates,
        }
    }

    fn session() -> SessionId {
        SessionId::new(1)
    }

    #[test]
    fn test_begin_is_idempotent() {
        let mut manager = TransactionManager::new();
        let id = TransactionId::new(1);
        assert_eq!(manager.begin(id, session(), 5), 5);
        // Repeating with a later counter value still returns the original
        assert_eq!(manager.begin(id, session(), 9), 5);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_prepare_commit_applies_all_updates() {
        let mut store = EntryStore::new();
        let mut versions = VersionCounter::new(0);
        let now = Timestamp::from_millis(10);
        store.apply_write(key("a"), vec![1], 0, versions.allocate(), now);

        let mut manager = TransactionManager::new();
        let result = manager.prepare(
            log(
                1,
                1,
                vec![put("a", &[9], Some(1)), put("b", &[8], Some(0))],
            ),
            session(),
            &store,
        );
        assert_eq!(result, PrepareResult::Ok);
        assert_eq!(manager.locked_keys().len(), 2);

        let (commit, events) = manager.commit(
            TransactionId::new(1),
            &mut store,
            &mut versions,
            Timestamp::from_millis(20),
        );
        assert_eq!(commit, CommitResult::Ok);
        assert_eq!(events.len(), 2);

        // Contiguous versions, locks gone, record erased
        assert_eq!(store.current_version(&key("a")), 2);
        assert_eq!(store.current_version(&key("b")), 3);
        assert!(manager.locked_keys().is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_prepare_version_mismatch_is_optimistic_failure() {
        let mut store = EntryStore::new();
        let mut versions = VersionCounter::new(0);
        store.apply_write(key("a"), vec![1], 0, versions.allocate(), Timestamp::EPOCH);

        let mut manager = TransactionManager::new();
        let result = manager.prepare(log(1, 1, vec![put("a", &[2], Some(999))]), session(), &store);
        assert_eq!(result, PrepareResult::OptimisticLockFailure);
        assert!(manager.locked_keys().is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_contending_prepare_is_concurrent_transaction() {
        let store = EntryStore::new();
        let mut manager = TransactionManager::new();

        assert_eq!(
            manager.prepare(log(1, 0, vec![put("k", &[1], Some(0))]), session(), &store),
            PrepareResult::Ok
        );
        assert_eq!(
            manager.prepare(log(2, 0, vec![put("k", &[2], Some(0))]), session(), &store),
            PrepareResult::ConcurrentTransaction
        );
        assert_eq!(manager.lock_owner(&key("k")), Some(TransactionId::new(1)));
    }

    #[test]
    fn test_failed_prepare_releases_nothing_it_did_not_hold() {
        let mut store = EntryStore::new();
        let mut versions = VersionCounter::new(0);
        store.apply_write(key("b"), vec![1], 0, versions.allocate(), Timestamp::EPOCH);

        let store_ref = &store;
        let mut manager = TransactionManager::new();
        assert_eq!(
            manager.prepare(log(1, 0, vec![put("b", &[1], Some(1))]), session(), store_ref),
            PrepareResult::Ok
        );

        // T2 wants "a" (free) then "b" (locked by T1): validation fails on
        // "b" before any lock is taken, so "a" stays free.
        assert_eq!(
            manager.prepare(
                log(2, 0, vec![put("a", &[1], None), put("b", &[2], Some(1))]),
                session(),
                store_ref
            ),
            PrepareResult::ConcurrentTransaction
        );
        assert_eq!(manager.lock_owner(&key("a")), None);
    }

    #[test]
    fn test_reprepare_is_idempotent() {
        let store = EntryStore::new();
        let mut manager = TransactionManager::new();
        let the_log = log(1, 0, vec![put("k", &[1], Some(0))]);

        assert_eq!(
            manager.prepare(the_log.clone(), session(), &store),
            PrepareResult::Ok
        );
        assert_eq!(
            manager.prepare(the_log, session(), &store),
            PrepareResult::Ok
        );
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.locked_keys().len(), 1);
    }

    #[test]
    fn test_commit_unknown_and_unprepared() {
        let mut store = EntryStore::new();
        let mut versions = VersionCounter::new(0);
        let mut manager = TransactionManager::new();

        let (result, events) = manager.commit(
            TransactionId::new(7),
            &mut store,
            &mut versions,
            Timestamp::EPOCH,
        );
        assert_eq!(result, CommitResult::UnknownTransactionId);
        assert!(events.is_empty());

        // Active but never prepared
        manager.begin(TransactionId::new(7), session(), 0);
        let (result, _) = manager.commit(
            TransactionId::new(7),
            &mut store,
            &mut versions,
            Timestamp::EPOCH,
        );
        assert_eq!(result, CommitResult::FailureDuringCommit);
        // The record survives a failed commit
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_rollback_releases_locks() {
        let store = EntryStore::new();
        let mut manager = TransactionManager::new();
        manager.prepare(log(1, 0, vec![put("k", &[1], Some(0))]), session(), &store);

        assert_eq!(manager.rollback(TransactionId::new(1)), RollbackResult::Ok);
        assert!(manager.locked_keys().is_empty());
        assert_eq!(
            manager.rollback(TransactionId::new(1)),
            RollbackResult::UnknownTransactionId
        );
    }

    #[test]
    fn test_transactional_remove_and_lock_updates() {
        let mut store = EntryStore::new();
        let mut versions = VersionCounter::new(0);
        store.apply_write(key("gone"), vec![1], 0, versions.allocate(), Timestamp::EPOCH);
        store.apply_write(key("held"), vec![2], 0, versions.allocate(), Timestamp::EPOCH);

        let mut manager = TransactionManager::new();
        let result = manager.prepare(
            log(
                1,
                2,
                vec![
                    MapUpdate::Remove {
                        key: key("gone"),
                        expected_version: Some(1),
                    },
                    MapUpdate::Lock {
                        key: key("held"),
                        expected_version: 2,
                    },
                ],
            ),
            session(),
            &store,
        );
        assert_eq!(result, PrepareResult::Ok);

        let (commit, events) = manager.commit(
            TransactionId::new(1),
            &mut store,
            &mut versions,
            Timestamp::from_millis(5),
        );
        assert_eq!(commit, CommitResult::Ok);

        // Remove produced an event; Lock produced none and left the entry
        assert_eq!(events.len(), 1);
        assert!(!store.contains_key(&key("gone")));
        assert_eq!(store.current_version(&key("held")), 2);
        // Lock updates mint no versions
        assert_eq!(versions.current(), 2);
    }

    #[test]
    fn test_expire_session_drops_active_keeps_prepared() {
        let store = EntryStore::new();
        let mut manager = TransactionManager::new();
        let doomed_session = SessionId::new(10);
        let other_session = SessionId::new(11);

        manager.begin(TransactionId::new(1), doomed_session, 0);
        manager.begin(TransactionId::new(2), other_session, 0);
        manager.prepare(
            log(3, 0, vec![put("k", &[1], Some(0))]),
            doomed_session,
            &store,
        );

        let orphaned = manager.expire_session(doomed_session);
        assert_eq!(orphaned, vec![TransactionId::new(1)]);
        assert_eq!(manager.len(), 2);
        // The prepared transaction still holds its lock
        assert_eq!(manager.lock_owner(&key("k")), Some(TransactionId::new(3)));
    }

    #[test]
    fn test_from_records_rebuilds_locks() {
        let store = EntryStore::new();
        let mut manager = TransactionManager::new();
        manager.begin(TransactionId::new(1), session(), 0);
        manager.prepare(log(2, 0, vec![put("k", &[1], Some(0))]), session(), &store);

        let records: Vec<TransactionRecord> = manager.records().cloned().collect();
        let rebuilt = TransactionManager::from_records(records).unwrap();
        assert_eq!(rebuilt, manager);
        assert_eq!(rebuilt.lock_owner(&key("k")), Some(TransactionId::new(2)));
    }

}
