//! Identifier newtypes shared across the state machine
//!
//! Sessions and transactions are identified by opaque 64-bit ids minted by
//! the consensus layer and the client-side coordinator respectively. The
//! state machine never holds pointers to session or listener objects, only
//! these ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Map key
///
/// Keys are UTF-8 strings ordered lexicographically by their byte
/// representation. This ordering is load-bearing: `clear` event order, TTL
/// drain tie-breaks, and snapshot section order all follow `Ord` on `Key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key from anything string-like
    pub fn new(key: impl Into<String>) -> Self {
        Key(key.into())
    }

    /// View the key as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// View the key's raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume and return the underlying string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}

/// Session identifier
///
/// Minted by the consensus layer's session manager. The state machine uses
/// it to route change events and to garbage-collect state owned by closed
/// sessions; it never outlives the session-expire command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw session id
    #[inline]
    pub const fn new(id: u64) -> Self {
        SessionId(id)
    }

    /// Get the raw id
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Transaction identifier
///
/// Chosen by the client-side transaction coordinator. Unique among in-flight
/// transactions on one map; the state machine does not allocate these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wrap a raw transaction id
    #[inline]
    pub const fn new(id: u64) -> Self {
        TransactionId(id)
    }

    /// Get the raw id
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}
