//! Command enum defining all map operations
//!
//! Commands are the instruction set of the map. Every operation the
//! consensus layer can deliver is a variant of this enum:
//! - **Self-contained**: all inputs for execution are in the variant
//!   (the originating session travels in the command context, not here)
//! - **Serializable**: MessagePack on the wire; a byte string that does
//!   not decode is rejected as malformed before any state change
//! - **Classified**: [`MapCommand::kind`] says whether an operation must be
//!   replicated through the log or may be served as a local read

use lockstep_concurrency::TransactionLog;
use lockstep_core::{Error, Key, Result, TransactionId};
use serde::{Deserialize, Serialize};

/// How an operation is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Read-only; may be served from the latest applied state without a
    /// log round-trip (subject to the caller's consistency level)
    Query,
    /// Mutating (or registering); must be replicated through the log
    Command,
}

/// A self-contained, serializable map operation
///
/// Write operations that take a TTL carry it as `ttl_millis`; 0 means no
/// expiry (the plain, TTL-less flavor of the operation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapCommand {
    // ==================== Reads ====================
    /// Number of entries.
    /// Returns: `Output::Uint`
    Size,

    /// Whether the map holds no entries.
    /// Returns: `Output::Bool`
    IsEmpty,

    /// Whether `key` has an entry.
    /// Returns: `Output::Bool`
    ContainsKey {
        /// Key to test
        key: Key,
    },

    /// Whether any entry's payload equals `value` byte-for-byte.
    /// Returns: `Output::Bool`
    ContainsValue {
        /// Payload to look for
        value: Vec<u8>,
    },

    /// Versioned value of `key`, if present.
    /// Returns: `Output::Maybe`
    Get {
        /// Key to read
        key: Key,
    },

    /// Versioned values for every requested key that is present.
    /// Returns: `Output::Entries`
    GetAllPresent {
        /// Keys to read
        keys: Vec<Key>,
    },

    /// Versioned value of `key`, or a version-0 wrapper around `default`.
    /// Returns: `Output::Versioned`
    GetOrDefault {
        /// Key to read
        key: Key,
        /// Payload to wrap when the key is absent
        default: Vec<u8>,
    },

    /// All keys, ascending.
    /// Returns: `Output::Keys`
    KeySet,

    /// All versioned values, in ascending key order.
    /// Returns: `Output::Values`
    Values,

    /// All entries, in ascending key order.
    /// Returns: `Output::Entries`
    EntrySet,

    // ==================== Single-key writes ====================
    /// Unconditional write; the result reports the previous value.
    /// Returns: `Output::Update`
    Put {
        /// Target key
        key: Key,
        /// New payload
        value: Vec<u8>,
        /// TTL in logical milliseconds; 0 disables expiry
        ttl_millis: u64,
    },

    /// Write only if the key is absent; a present key is a no-op
    /// reporting the current value.
    /// Returns: `Output::Update`
    PutIfAbsent {
        /// Target key
        key: Key,
        /// New payload
        value: Vec<u8>,
        /// TTL in logical milliseconds; 0 disables expiry
        ttl_millis: u64,
    },

    /// Unconditional write; identical effect to `Put`, kept as its own
    /// operation so proxies can surface the new value instead of the old.
    /// Returns: `Output::Update`
    PutAndGet {
        /// Target key
        key: Key,
        /// New payload
        value: Vec<u8>,
        /// TTL in logical milliseconds; 0 disables expiry
        ttl_millis: u64,
    },

    /// Unconditional delete.
    /// Returns: `Output::Update`
    Remove {
        /// Target key
        key: Key,
    },

    /// Delete only if the current payload equals `value`.
    /// Returns: `Output::Update`
    RemoveValue {
        /// Target key
        key: Key,
        /// Expected payload
        value: Vec<u8>,
    },

    /// Delete only if the current version equals `version`.
    /// Returns: `Output::Update`
    RemoveVersion {
        /// Target key
        key: Key,
        /// Expected version
        version: u64,
    },

    /// Rewrite an existing key; absent keys fail the precondition.
    /// Returns: `Output::Update`
    Replace {
        /// Target key
        key: Key,
        /// New payload
        value: Vec<u8>,
    },

    /// Rewrite only if the current payload equals `old_value`.
    /// Returns: `Output::Update`
    ReplaceValue {
        /// Target key
        key: Key,
        /// Expected payload
        old_value: Vec<u8>,
        /// New payload
        new_value: Vec<u8>,
    },

    /// Rewrite only if the current version equals `old_version`.
    /// Returns: `Output::Update`
    ReplaceVersion {
        /// Target key
        key: Key,
        /// Expected version
        old_version: u64,
        /// New payload
        new_value: Vec<u8>,
    },

    /// Remove every unlocked entry, emitting one Removed event per key in
    /// ascending key order.
    /// Returns: `Output::Unit`
    Clear,

    // ==================== Listeners ====================
    /// Subscribe the originating session to change events.
    /// Returns: `Output::Unit`
    AddListener,

    /// Unsubscribe the originating session.
    /// Returns: `Output::Unit`
    RemoveListener,

    // ==================== Transactions ====================
    /// Register a transaction and return its start version. Replicated
    /// (not a local read): the registration is part of snapshotted state.
    /// Returns: `Output::Version`
    Begin {
        /// Client-chosen transaction id
        transaction_id: TransactionId,
    },

    /// Validate a transaction log and stage it under write locks.
    /// Returns: `Output::Prepare`
    Prepare {
        /// Proposed update set
        log: TransactionLog,
    },

    /// Single-shot fast path: prepare and, on success, commit.
    /// Returns: `Output::Prepare`
    PrepareAndCommit {
        /// Proposed update set
        log: TransactionLog,
    },

    /// Apply a prepared transaction's staged updates.
    /// Returns: `Output::Commit`
    Commit {
        /// Transaction to commit
        transaction_id: TransactionId,
    },

    /// Discard a transaction's staging and release its locks.
    /// Returns: `Output::Rollback`
    Rollback {
        /// Transaction to roll back
        transaction_id: TransactionId,
    },

    // ==================== Session lifecycle ====================
    /// Delivered by the consensus layer when the originating session
    /// closes: drops the session's listener queue and garbage-collects its
    /// Active transactions.
    /// Returns: `Output::Unit`
    SessionExpired,
}

impl MapCommand {
    /// Classify this operation for request routing
    pub fn kind(&self) -> OperationKind {
        match self {
            MapCommand::Size
            | MapCommand::IsEmpty
            | MapCommand::ContainsKey { .. }
            | MapCommand::ContainsValue { .. }
            | MapCommand::Get { .. }
            | MapCommand::GetAllPresent { .. }
            | MapCommand::GetOrDefault { .. }
            | MapCommand::KeySet
            | MapCommand::Values
            | MapCommand::EntrySet => OperationKind::Query,

            MapCommand::Put { .. }
            | MapCommand::PutIfAbsent { .. }
            | MapCommand::PutAndGet { .. }
            | MapCommand::Remove { .. }
            | MapCommand::RemoveValue { .. }
            | MapCommand::RemoveVersion { .. }
            | MapCommand::Replace { .. }
            | MapCommand::ReplaceValue { .. }
            | MapCommand::ReplaceVersion { .. }
            | MapCommand::Clear
            | MapCommand::AddListener
            | MapCommand::RemoveListener
            | MapCommand::Begin { .. }
            | MapCommand::Prepare { .. }
            | MapCommand::PrepareAndCommit { .. }
            | MapCommand::Commit { .. }
            | MapCommand::Rollback { .. }
            | MapCommand::SessionExpired => OperationKind::Command,
        }
    }

    /// Serialize to MessagePack bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        rmp_serde::to_vec(self).expect("command serialization should not fail")
    }

    /// Deserialize from MessagePack bytes
    ///
    /// A failure here rejects the command before any state change.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::MalformedCommand(e.to_string()))
    }
}
