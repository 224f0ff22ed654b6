//! Logical-time timestamp type
//!
//! Every command delivered by the replicated log carries a monotone logical
//! timestamp (milliseconds as stamped by the log). All time arithmetic in the
//! state machine, TTL expiry above all, happens on these values. The state
//! machine never reads the wall clock: two replicas applying the same log
//! prefix must compute the same expirations.

use serde::{Deserialize, Serialize};

/// Millisecond-precision logical timestamp
///
/// Represents a point in the log's logical time. Comparable and orderable;
/// zero is the origin of time for a fresh map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The origin of logical time
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Maximum representable timestamp
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from milliseconds
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Add a millisecond duration, saturating at [`Timestamp::MAX`]
    #[inline]
    pub const fn saturating_add_millis(&self, millis: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(millis))
    }

    /// Later of two timestamps
    #[inline]
    pub fn max(self, other: Timestamp) -> Timestamp {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}
