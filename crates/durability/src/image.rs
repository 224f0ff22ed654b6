//! Decoded snapshot image

use lockstep_concurrency::TransactionRecord;
use lockstep_core::{Key, SessionId, Timestamp};
use lockstep_storage::MapEntry;

/// The complete state of one map state machine, in memory.
///
/// Every collection is held in its defined sort order (entries by key,
/// TTL nodes by `(expiry, key)`, transactions by id, listeners by session
/// id), so encoding an image is a straight walk and two images of equal
/// state compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineImage {
    /// Global version counter
    pub version_counter: u64,
    /// Logical time of the last applied command
    pub clock: Timestamp,
    /// Log index of the last applied command
    pub last_index: u64,
    /// Map entries, sorted by key
    pub entries: Vec<(Key, MapEntry)>,
    /// TTL-index nodes, sorted by `(expiry, key)`
    pub ttl_nodes: Vec<(Timestamp, Key)>,
    /// In-flight transactions, sorted by id
    pub transactions: Vec<TransactionRecord>,
    /// Subscribed sessions, sorted
    pub listeners: Vec<SessionId>,
}

impl MachineImage {
    /// An image of a fresh, empty state machine
    pub fn empty() -> Self {
        MachineImage {
            version_counter: 0,
            clock: Timestamp::EPOCH,
            last_index: 0,
            entries: Vec::new(),
            ttl_nodes: Vec::new(),
            transactions: Vec::new(),
            listeners: Vec::new(),
        }
    }
}
