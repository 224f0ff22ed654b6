//! The map state machine
//!
//! One instance per replica. The consensus layer delivers commands in log
//! order as `(index, timestamp, session, sequence, bytes)`; the machine
//! decodes, drains due expirations, dispatches, and returns the encoded
//! output. Handlers are pure state transitions; all I/O (event delivery,
//! snapshot shipping) happens outside, after they return.
//!
//! ## Effect order
//!
//! Every effective mutation commits four effects in this order, atomically
//! with respect to other commands (which apply serially):
//!
//! ```text
//! 1. version bump        (global counter)
//! 2. entry update        (primary map)
//! 3. TTL-index update    (kept in sync by the store)
//! 4. event publication   (listener queues)
//! ```
//!
//! Non-effects (no-ops, failed preconditions, writes against locked keys)
//! touch none of the four.

use crate::command::{MapCommand, OperationKind};
use crate::listeners::{ListenerConfig, ListenerRegistry, QueuedEvent};
use crate::output::Output;
use lockstep_concurrency::TransactionManager;
use lockstep_core::{
    Error, Key, MapEvent, Result, SessionId, Timestamp, UpdateResult, VersionCounter, Versioned,
};
use lockstep_durability::{decode, encode, MachineImage};
use lockstep_storage::EntryStore;
use tracing::{debug, warn};

/// Per-command metadata delivered by the consensus layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    /// Position in the replicated log
    pub index: u64,
    /// Monotone logical timestamp stamped by the log
    pub timestamp: Timestamp,
    /// Session that submitted the command
    pub session: SessionId,
    /// Session-scoped sequence number (client retry bookkeeping)
    pub sequence: u64,
}

impl CommandContext {
    /// Bundle the delivery tuple
    pub fn new(index: u64, timestamp: Timestamp, session: SessionId, sequence: u64) -> Self {
        CommandContext {
            index,
            timestamp,
            session,
            sequence,
        }
    }
}

/// Value-predicate for the conditional delete flavors
enum RemovePredicate {
    Always,
    ValueEquals(Vec<u8>),
    VersionEquals(u64),
}

/// Value-predicate for the replace flavors
enum ReplacePredicate {
    Present,
    ValueEquals(Vec<u8>),
    VersionEquals(u64),
}

/// Deterministic replicated state machine for one versioned map
#[derive(Debug, Clone)]
pub struct MapStateMachine {
    versions: VersionCounter,
    store: EntryStore,
    transactions: TransactionManager,
    listeners: ListenerRegistry,
    clock: Timestamp,
    last_index: u64,
}

impl Default for MapStateMachine {
    fn default() -> Self {
        MapStateMachine::new()
    }
}

impl MapStateMachine {
    /// A fresh, empty state machine
    pub fn new() -> Self {
        MapStateMachine::with_config(ListenerConfig::default())
    }

    /// A fresh state machine with explicit listener tuning
    pub fn with_config(config: ListenerConfig) -> Self {
        MapStateMachine {
            versions: VersionCounter::new(0),
            store: EntryStore::new(),
            transactions: TransactionManager::new(),
            listeners: ListenerRegistry::new(config),
            clock: Timestamp::EPOCH,
            last_index: 0,
        }
    }

    // ========== Log-applied path ==========

    /// Decode, apply, and encode one replicated command.
    ///
    /// A byte string that does not decode is rejected with
    /// [`Error::MalformedCommand`] before any state change, including the
    /// TTL drain, which only runs for commands that actually apply.
    pub fn apply(&mut self, ctx: &CommandContext, command_bytes: &[u8]) -> Result<Vec<u8>> {
        let command = MapCommand::from_bytes(command_bytes)?;
        let output = self.apply_command(ctx, command)?;
        Ok(output.to_bytes())
    }

    /// Typed variant of [`apply`](Self::apply)
    pub fn apply_command(&mut self, ctx: &CommandContext, command: MapCommand) -> Result<Output> {
        self.advance(ctx);
        debug!(index = ctx.index, session = %ctx.session, ?command, "applying");
        match command.kind() {
            // Linearizable reads routed through the log dispatch like any
            // command; they observe the drain that just ran.
            OperationKind::Query => self.read(&command),
            OperationKind::Command => self.write(ctx, command),
        }
    }

    /// Serve a read against the latest applied state, outside the log.
    ///
    /// Mutating operations are refused: they exist only as log entries.
    pub fn query(&self, command: &MapCommand) -> Result<Output> {
        match command.kind() {
            OperationKind::Query => self.read(command),
            OperationKind::Command => Err(Error::MalformedCommand(
                "operation mutates state and must be replicated through the log".to_string(),
            )),
        }
    }

    /// Pull (and clear) a session's queued change events
    pub fn poll_events(&mut self, session: SessionId) -> Vec<QueuedEvent> {
        self.listeners.drain(session)
    }

    // ========== Introspection for the consensus layer ==========

    /// Logical time of the last applied command
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// Log index of the last applied command
    pub fn last_applied_index(&self) -> u64 {
        self.last_index
    }

    /// Current global version
    pub fn current_version(&self) -> u64 {
        self.versions.current()
    }

    // ========== Snapshotting ==========

    /// Emit the deterministic byte image of the full state
    pub fn snapshot(&self) -> Vec<u8> {
        encode(&self.image())
    }

    /// The full state as an in-memory image, collections in sort order
    pub fn image(&self) -> MachineImage {
        MachineImage {
            version_counter: self.versions.current(),
            clock: self.clock,
            last_index: self.last_index,
            entries: self
                .store
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
            ttl_nodes: self.store.ttl_nodes(),
            transactions: self.transactions.records().cloned().collect(),
            listeners: self.listeners.sessions(),
        }
    }

    /// Restore a state machine from a snapshot image
    pub fn restore(snapshot_bytes: &[u8]) -> Result<Self> {
        MapStateMachine::restore_with_config(snapshot_bytes, ListenerConfig::default())
    }

    /// Restore with explicit listener tuning
    pub fn restore_with_config(snapshot_bytes: &[u8], config: ListenerConfig) -> Result<Self> {
        let image =
            decode(snapshot_bytes).map_err(|e| Error::SnapshotCorrupt(e.to_string()))?;
        let store = EntryStore::from_parts(image.entries, image.ttl_nodes)?;
        let transactions = TransactionManager::from_records(image.transactions)?;
        let listeners = ListenerRegistry::from_sessions(config, image.listeners);
        Ok(MapStateMachine {
            versions: VersionCounter::new(image.version_counter),
            store,
            transactions,
            listeners,
            clock: image.clock,
            last_index: image.last_index,
        })
    }

    // ========== Clock & expiry ==========

    /// Advance the logical clock and drain due expirations, emitting their
    /// Removed events before the incoming command's own effect.
    ///
    /// Locked keys are exempt: a prepared transaction's validated view must
    /// hold until it commits or rolls back, so their expiry is deferred to
    /// the first drain after the locks release.
    fn advance(&mut self, ctx: &CommandContext) {
        self.last_index = ctx.index;
        self.clock = self.clock.max(ctx.timestamp);
        let locked = self.transactions.locked_keys();
        let expired = self.store.drain_expired(self.clock, &locked);
        for (key, entry) in expired {
            let event = MapEvent::removed(key, entry.into_versioned());
            self.listeners.publish(&event);
        }
    }

    // ========== Dispatch ==========

    fn read(&self, command: &MapCommand) -> Result<Output> {
        Ok(match command {
            MapCommand::Size => Output::Uint(self.store.len() as u64),
            MapCommand::IsEmpty => Output::Bool(self.store.is_empty()),
            MapCommand::ContainsKey { key } => Output::Bool(self.store.contains_key(key)),
            MapCommand::ContainsValue { value } => Output::Bool(self.store.contains_value(value)),
            MapCommand::Get { key } => Output::Maybe(self.store.get_versioned(key)),
            MapCommand::GetAllPresent { keys } => {
                Output::Entries(self.store.get_all_present(keys.iter()))
            }
            MapCommand::GetOrDefault { key, default } => Output::Versioned(
                self.store
                    .get_versioned(key)
                    .unwrap_or_else(|| Versioned::absent_default(default.clone())),
            ),
            MapCommand::KeySet => Output::Keys(self.store.keys()),
            MapCommand::Values => Output::Values(self.store.values()),
            MapCommand::EntrySet => Output::Entries(self.store.entries()),
            _ => {
                return Err(Error::IllegalState(
                    "mutating operation dispatched to the read path".to_string(),
                ))
            }
        })
    }

    fn write(&mut self, ctx: &CommandContext, command: MapCommand) -> Result<Output> {
        Ok(match command {
            MapCommand::Put {
                key,
                value,
                ttl_millis,
            }
            | MapCommand::PutAndGet {
                key,
                value,
                ttl_millis,
            } => Output::Update(self.put(ctx, key, value, ttl_millis, false)),

            MapCommand::PutIfAbsent {
                key,
                value,
                ttl_millis,
            } => Output::Update(self.put(ctx, key, value, ttl_millis, true)),

            MapCommand::Remove { key } => {
                Output::Update(self.remove(key, RemovePredicate::Always))
            }
            MapCommand::RemoveValue { key, value } => {
                Output::Update(self.remove(key, RemovePredicate::ValueEquals(value)))
            }
            MapCommand::RemoveVersion { key, version } => {
                Output::Update(self.remove(key, RemovePredicate::VersionEquals(version)))
            }

            MapCommand::Replace { key, value } => {
                Output::Update(self.replace(ctx, key, ReplacePredicate::Present, value))
            }
            MapCommand::ReplaceValue {
                key,
                old_value,
                new_value,
            } => Output::Update(self.replace(
                ctx,
                key,
                ReplacePredicate::ValueEquals(old_value),
                new_value,
            )),
            MapCommand::ReplaceVersion {
                key,
                old_version,
                new_value,
            } => Output::Update(self.replace(
                ctx,
                key,
                ReplacePredicate::VersionEquals(old_version),
                new_value,
            )),

            MapCommand::Clear => {
                self.clear();
                Output::Unit
            }

            MapCommand::AddListener => {
                self.listeners.subscribe(ctx.session);
                Output::Unit
            }
            MapCommand::RemoveListener => {
                self.listeners.unsubscribe(ctx.session);
                Output::Unit
            }

            MapCommand::Begin { transaction_id } => Output::Version(self.transactions.begin(
                transaction_id,
                ctx.session,
                self.versions.current(),
            )),
            MapCommand::Prepare { log } => {
                Output::Prepare(self.transactions.prepare(log, ctx.session, &self.store))
            }
            MapCommand::PrepareAndCommit { log } => {
                let (result, events) = self.transactions.prepare_and_commit(
                    log,
                    ctx.session,
                    &mut self.store,
                    &mut self.versions,
                    ctx.timestamp,
                );
                self.publish_all(events);
                Output::Prepare(result)
            }
            MapCommand::Commit { transaction_id } => {
                let (result, events) = self.transactions.commit(
                    transaction_id,
                    &mut self.store,
                    &mut self.versions,
                    ctx.timestamp,
                );
                self.publish_all(events);
                Output::Commit(result)
            }
            MapCommand::Rollback { transaction_id } => {
                Output::Rollback(self.transactions.rollback(transaction_id))
            }

            MapCommand::SessionExpired => {
                self.session_closed(ctx.session);
                Output::Unit
            }

            _ => {
                return Err(Error::IllegalState(
                    "query dispatched to the write path".to_string(),
                ))
            }
        })
    }

    // ========== Single-key handlers ==========

    fn put(
        &mut self,
        ctx: &CommandContext,
        key: Key,
        value: Vec<u8>,
        ttl_millis: u64,
        if_absent: bool,
    ) -> UpdateResult {
        if self.transactions.lock_owner(&key).is_some() {
            return UpdateResult::write_lock(key);
        }
        let current = self.store.get_versioned(&key);
        if if_absent && current.is_some() {
            return UpdateResult::noop(key, current);
        }

        let version = self.versions.allocate();
        let new = Versioned::new(value.clone(), version, ctx.timestamp);
        let old = self
            .store
            .apply_write(key.clone(), value, ttl_millis, version, ctx.timestamp)
            .map(|entry| entry.into_versioned());
        let event = match &old {
            Some(old) => MapEvent::updated(key.clone(), old.clone(), new.clone()),
            None => MapEvent::inserted(key.clone(), new.clone()),
        };
        self.listeners.publish(&event);
        UpdateResult::ok(key, old, Some(new))
    }

    fn remove(&mut self, key: Key, predicate: RemovePredicate) -> UpdateResult {
        if self.transactions.lock_owner(&key).is_some() {
            return UpdateResult::write_lock(key);
        }
        let Some(current) = self.store.get_versioned(&key) else {
            // Unconditional remove of nothing is a no-op; a conditional one
            // has a predicate that cannot hold.
            return match predicate {
                RemovePredicate::Always => UpdateResult::noop(key, None),
                _ => UpdateResult::precondition_failed(key, None),
            };
        };
        let holds = match &predicate {
            RemovePredicate::Always => true,
            RemovePredicate::ValueEquals(expected) => current.value == *expected,
            RemovePredicate::VersionEquals(expected) => current.version == *expected,
        };
        if !holds {
            return UpdateResult::precondition_failed(key, Some(current));
        }

        match self.store.apply_remove(&key) {
            Some(old) => {
                let old = old.into_versioned();
                self.listeners
                    .publish(&MapEvent::removed(key.clone(), old.clone()));
                UpdateResult::ok(key, Some(old), None)
            }
            None => UpdateResult::noop(key, None),
        }
    }

    fn replace(
        &mut self,
        ctx: &CommandContext,
        key: Key,
        predicate: ReplacePredicate,
        new_value: Vec<u8>,
    ) -> UpdateResult {
        if self.transactions.lock_owner(&key).is_some() {
            return UpdateResult::write_lock(key);
        }
        let Some(current) = self.store.get_versioned(&key) else {
            return UpdateResult::precondition_failed(key, None);
        };
        let holds = match &predicate {
            ReplacePredicate::Present => true,
            ReplacePredicate::ValueEquals(expected) => current.value == *expected,
            ReplacePredicate::VersionEquals(expected) => current.version == *expected,
        };
        if !holds {
            return UpdateResult::precondition_failed(key, Some(current));
        }

        let version = self.versions.allocate();
        let new = Versioned::new(new_value.clone(), version, ctx.timestamp);
        let old = self
            .store
            .apply_write(key.clone(), new_value, 0, version, ctx.timestamp)
            .map(|entry| entry.into_versioned());
        if let Some(old) = &old {
            self.listeners
                .publish(&MapEvent::updated(key.clone(), old.clone(), new.clone()));
        }
        UpdateResult::ok(key, old, Some(new))
    }

    fn clear(&mut self) {
        for key in self.store.keys() {
            if self.transactions.lock_owner(&key).is_some() {
                continue;
            }
            if let Some(old) = self.store.apply_remove(&key) {
                self.listeners
                    .publish(&MapEvent::removed(key, old.into_versioned()));
            }
        }
    }

    fn session_closed(&mut self, session: SessionId) {
        let orphaned = self.transactions.expire_session(session);
        if !orphaned.is_empty() {
            warn!(
                %session,
                count = orphaned.len(),
                "discarded active transactions of closed session"
            );
        }
        self.listeners.drop_session(session);
    }

    fn publish_all(&mut self, events: Vec<MapEvent>) {
        for event in events {
            self.listeners.publish(&event);
        }
    }
}
