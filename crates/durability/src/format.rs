//! Snapshot wire format
//!
//! # Layout
//!
//! ```text
//! +---------------------+ 0
//! | SnapshotHeader      | 32 bytes
//! +---------------------+ 32
//! | Section 0x01        | tag u8 | data_len u64 | entries payload
//! +---------------------+
//! | Section 0x02        | tag u8 | data_len u64 | ttl-index payload
//! +---------------------+
//! | Section 0x03        | tag u8 | data_len u64 | transactions payload
//! +---------------------+
//! | Section 0x04        | tag u8 | data_len u64 | listeners payload
//! +---------------------+
//! ```
//!
//! All integers are little-endian; strings and byte payloads are
//! `u32`-length-prefixed. Sections appear in exactly this order and every
//! collection is written in its defined sort order, so two replicas with
//! the same state produce identical bytes.

use thiserror::Error;

/// Magic bytes: "LSTP"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"LSTP";

/// Snapshot format version for forward compatibility
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshot header size in bytes
pub const SNAPSHOT_HEADER_SIZE: usize = 32;

/// Section tags, in their required file order
pub mod section_tags {
    /// Map entries, sorted by key
    pub const ENTRIES: u8 = 0x01;
    /// TTL-index nodes, sorted by (expiry, key)
    pub const TTL: u8 = 0x02;
    /// In-flight transactions, sorted by id
    pub const TRANSACTIONS: u8 = 0x03;
    /// Listener subscriptions, sorted by session id
    pub const LISTENERS: u8 = 0x04;

    /// All tags in their required order
    pub const ALL: [u8; 4] = [ENTRIES, TTL, TRANSACTIONS, LISTENERS];
}

/// Tag bytes for staged transaction updates
pub mod update_tags {
    /// Put update
    pub const PUT: u8 = 0x01;
    /// Remove update
    pub const REMOVE: u8 = 0x02;
    /// Lock (read assertion) update
    pub const LOCK: u8 = 0x03;
}

/// Tag bytes for transaction states
pub mod state_tags {
    /// Active
    pub const ACTIVE: u8 = 0x01;
    /// Prepared
    pub const PREPARED: u8 = 0x02;
    /// Committed (transient; never observed in a snapshot)
    pub const COMMITTED: u8 = 0x03;
    /// Rolled back (transient; never observed in a snapshot)
    pub const ROLLED_BACK: u8 = 0x04;
}

/// Snapshot header (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Global version counter at snapshot time
    pub version_counter: u64,
    /// Logical time of the last applied command
    pub clock: u64,
    /// Log index of the last applied command
    pub last_index: u64,
}

impl SnapshotHeader {
    /// Create a header for the current format version
    pub fn new(version_counter: u64, clock: u64, last_index: u64) -> Self {
        SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            format_version: SNAPSHOT_FORMAT_VERSION,
            version_counter,
            clock,
            last_index,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_HEADER_SIZE] {
        let mut bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.version_counter.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.clock.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.last_index.to_le_bytes());
        bytes
    }

    /// Parse from bytes (length is the caller's problem; validation is not)
    pub fn from_bytes(bytes: &[u8; SNAPSHOT_HEADER_SIZE]) -> Self {
        SnapshotHeader {
            magic: bytes[0..4].try_into().expect("slice length fixed"),
            format_version: u32::from_le_bytes(bytes[4..8].try_into().expect("slice length fixed")),
            version_counter: u64::from_le_bytes(
                bytes[8..16].try_into().expect("slice length fixed"),
            ),
            clock: u64::from_le_bytes(bytes[16..24].try_into().expect("slice length fixed")),
            last_index: u64::from_le_bytes(bytes[24..32].try_into().expect("slice length fixed")),
        }
    }

    /// Validate magic and version
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic { actual: self.magic });
        }
        if self.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                version: self.format_version,
                max_supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(())
    }
}

/// Snapshot parsing errors
///
/// Decoding is total: every malformed input maps to one of these, and none
/// of them is recoverable: a corrupt snapshot aborts the replica.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Input ended before the structure it promised
    #[error("truncated snapshot: needed {needed} more bytes at offset {offset}")]
    Truncated {
        /// Byte offset where reading stopped
        offset: usize,
        /// Bytes still required
        needed: usize,
    },

    /// Wrong magic bytes
    #[error("bad magic: expected {:?}, got {actual:?}", SNAPSHOT_MAGIC)]
    BadMagic {
        /// Magic bytes found
        actual: [u8; 4],
    },

    /// Format version newer than this build understands
    #[error("unsupported snapshot version {version}, max supported is {max_supported}")]
    UnsupportedVersion {
        /// Version found in the header
        version: u32,
        /// Newest version this build reads
        max_supported: u32,
    },

    /// A section appeared out of order or with an unknown tag
    #[error("expected section {expected:#04x}, found {actual:#04x}")]
    UnexpectedSection {
        /// Tag required at this position
        expected: u8,
        /// Tag found
        actual: u8,
    },

    /// A section's payload did not consume exactly its declared length
    #[error("section {tag:#04x} length mismatch")]
    SectionLengthMismatch {
        /// Offending section tag
        tag: u8,
    },

    /// An unknown tag byte inside a section
    #[error("invalid {what} tag: {tag:#04x}")]
    InvalidTag {
        /// What kind of tag was being read
        what: &'static str,
        /// Tag found
        tag: u8,
    },

    /// A key was not valid UTF-8
    #[error("invalid string encoding")]
    InvalidString,

    /// A collection violated its defined sort order
    #[error("{0} section out of order")]
    Unsorted(&'static str),

    /// Bytes remained after the final section
    #[error("{0} trailing bytes after final section")]
    TrailingBytes(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = SnapshotHeader::new(42, 1000, 7);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), SNAPSHOT_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"LSTP");
        assert_eq!(SnapshotHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_header_validation() {
        let header = SnapshotHeader::new(1, 2, 3);
        assert!(header.validate().is_ok());

        let mut bad = header;
        bad.magic = *b"NOPE";
        assert!(matches!(
            bad.validate(),
            Err(SnapshotError::BadMagic { .. })
        ));

        let mut future = header;
        future.format_version = 999;
        assert!(matches!(
            future.validate(),
            Err(SnapshotError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_section_tags_ordered() {
        assert_eq!(
            section_tags::ALL,
            [
                section_tags::ENTRIES,
                section_tags::TTL,
                section_tags::TRANSACTIONS,
                section_tags::LISTENERS,
            ]
        );
    }
}
