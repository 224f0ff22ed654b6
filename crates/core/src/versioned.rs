//! Versioned value wrapper
//!
//! Every read returns its value wrapped in a `Versioned`; every successful
//! mutation mints exactly one new version. The pair `(version, created)` is
//! what optimistic concurrency compares against.

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// A value with its version information
///
/// ## Invariants
///
/// - `version` always matches the mutation that created this data
/// - `created` is the logical time of that mutation's command
/// - the wrapper is immutable once minted; new writes mint new wrappers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned {
    /// The payload bytes (opaque to the state machine)
    pub value: Vec<u8>,

    /// Version minted by the global counter
    pub version: u64,

    /// Logical time of the creating command
    pub created: Timestamp,
}

impl Versioned {
    /// Wrap a value with its version metadata
    pub fn new(value: Vec<u8>, version: u64, created: Timestamp) -> Self {
        Versioned {
            value,
            version,
            created,
        }
    }

    /// A wrapper for an absent entry carrying caller-supplied default bytes.
    ///
    /// Version 0 is never minted by the counter, so the result is
    /// distinguishable from any live entry.
    pub fn absent_default(default: Vec<u8>) -> Self {
        Versioned {
            value: default,
            version: 0,
            created: Timestamp::EPOCH,
        }
    }

    /// Get a reference to the payload
    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consume and return the payload
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Extract payload, version, and creation time
    pub fn into_parts(self) -> (Vec<u8>, u64, Timestamp) {
        (self.value, self.version, self.created)
    }
}
