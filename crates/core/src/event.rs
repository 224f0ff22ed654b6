//! Change events published to subscribed sessions
//!
//! Every committed state change produces exactly one event. Events are
//! queued per session by the listener registry and pulled by the session
//! layer; delivery order per session matches command application order.

use crate::types::Key;
use crate::versioned::Versioned;
use serde::{Deserialize, Serialize};

/// Kind of change an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A key that was absent now has a value
    Inserted,
    /// An existing key's value was rewritten
    Updated,
    /// A key was removed (explicitly, by clear, by TTL expiry, or by a
    /// committed transactional remove)
    Removed,
}

/// A single map change notification
///
/// `old` and `new` carry the versioned values on either side of the
/// transition: inserts have no `old`, removes have no `new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEvent {
    /// What happened
    pub kind: EventKind,
    /// The key that changed
    pub key: Key,
    /// Value before the change, if the key was present
    pub old: Option<Versioned>,
    /// Value after the change, if the key is present
    pub new: Option<Versioned>,
}

impl MapEvent {
    /// Event for a key that was absent and now holds `new`
    pub fn inserted(key: Key, new: Versioned) -> Self {
        MapEvent {
            kind: EventKind::Inserted,
            key,
            old: None,
            new: Some(new),
        }
    }

    /// Event for a key rewritten from `old` to `new`
    pub fn updated(key: Key, old: Versioned, new: Versioned) -> Self {
        MapEvent {
            kind: EventKind::Updated,
            key,
            old: Some(old),
            new: Some(new),
        }
    }

    /// Event for a key that held `old` and is now absent
    pub fn removed(key: Key, old: Versioned) -> Self {
        MapEvent {
            kind: EventKind::Removed,
            key,
            old: Some(old),
            new: None,
        }
    }
}
