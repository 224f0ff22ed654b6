//! # Lockstep
//!
//! A deterministic replicated state machine for a versioned, transactional
//! key-value map: the engine a consensus layer (Raft or equivalent) drives
//! by applying an ordered command stream and serving reads at a chosen
//! consistency level.
//!
//! Every key maps to an opaque byte payload plus a monotone version and an
//! optional TTL. On top of that the machine implements conditional
//! mutation (compare-and-set by value or version), optimistic two-phase
//! transactions with per-key write locks, session-scoped change events,
//! and a canonical snapshot byte format: two replicas that applied the
//! same log prefix hold byte-identical state.
//!
//! # Quick Start
//!
//! ```
//! use lockstep::{
//!     CommandContext, Key, MapCommand, MapStateMachine, Output, SessionId, Timestamp,
//! };
//!
//! fn main() -> lockstep::Result<()> {
//!     let mut machine = MapStateMachine::new();
//!     let ctx = CommandContext::new(1, Timestamp::from_millis(10), SessionId::new(1), 1);
//!
//!     // Commands arrive from the log as bytes...
//!     let command = MapCommand::Put {
//!         key: Key::from("user:name"),
//!         value: b"alice".to_vec(),
//!         ttl_millis: 0,
//!     };
//!     let response = machine.apply(&ctx, &command.to_bytes())?;
//!     let output = Output::from_bytes(&response)?;
//!     assert!(matches!(output, Output::Update(_)));
//!
//!     // ...while reads can be served locally.
//!     let read = machine.query(&MapCommand::Get {
//!         key: Key::from("user:name"),
//!     })?;
//!     match read {
//!         Output::Maybe(Some(versioned)) => assert_eq!(versioned.version, 1),
//!         other => panic!("unexpected output {:?}", other),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Reads | `Size`, `IsEmpty`, `ContainsKey`, `ContainsValue`, `Get`, `GetAllPresent`, `GetOrDefault`, `KeySet`, `Values`, `EntrySet` |
//! | Writes | `Put`, `PutIfAbsent`, `PutAndGet` (each with optional TTL), `Remove`, `RemoveValue`, `RemoveVersion`, `Replace`, `ReplaceValue`, `ReplaceVersion`, `Clear` |
//! | Listeners | `AddListener`, `RemoveListener` |
//! | Transactions | `Begin`, `Prepare`, `PrepareAndCommit`, `Commit`, `Rollback` |
//! | Lifecycle | `SessionExpired` |
//!
//! # Architecture
//!
//! [`MapStateMachine`] is the single entry point. The
//! [`MapCommand`]/[`Output`] enum pair is the serializable instruction set
//! the consensus layer ships; [`MapCommand::kind`] classifies each
//! operation as a replicated command or a locally-servable query. Internal
//! crates (storage, concurrency, durability) are re-exported for embedders
//! that need the pieces, but the `MapStateMachine` surface is the stable
//! one.

// Core types
pub use lockstep_core::{
    CommitResult, Error, EventKind, Key, MapEvent, PrepareResult, Result, RollbackResult,
    SessionId, Timestamp, TransactionId, UpdateResult, UpdateStatus, VersionCounter, Versioned,
};

// Storage layer
pub use lockstep_storage::{EntryStore, MapEntry, TtlIndex};

// Transaction layer
pub use lockstep_concurrency::{
    LockTable, MapUpdate, TransactionLog, TransactionManager, TransactionRecord, TransactionState,
};

// Snapshot format
pub use lockstep_durability::{
    decode as decode_snapshot, encode as encode_snapshot, MachineImage, SnapshotError,
    SnapshotHeader,
};

// Engine
pub use lockstep_engine::{
    CommandContext, ListenerConfig, ListenerRegistry, MapCommand, MapStateMachine, OperationKind,
    Output, QueuedEvent,
};
