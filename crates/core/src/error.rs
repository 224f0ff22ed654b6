//! Error types for the lockstep state machine
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Client-visible failures are **not** errors. A failed compare-and-set, a
//! write against a locked key, or an unknown transaction id is encoded in the
//! operation's result value ([`crate::UpdateResult`] and friends) and returned
//! to the caller as ordinary data. `Error` covers only the two structural
//! cases the consensus layer must see:
//!
//! - a command byte string that does not decode (rejected before any state
//!   change),
//! - a snapshot image or internal invariant that is broken (fatal; the
//!   consensus layer aborts and recovers the replica).

use thiserror::Error;

/// Result type alias for lockstep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the lockstep state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Command bytes did not decode into a known operation
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Snapshot image failed validation during restore
    #[error("snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    /// An internal invariant was violated; the replica must not continue
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl Error {
    /// Check whether this error is fatal for the replica.
    ///
    /// Malformed commands are per-request rejections; everything else means
    /// the replica's state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedCommand(_))
    }
}
