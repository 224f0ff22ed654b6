//! Snapshot byte format for the lockstep map state machine
//!
//! On demand from the consensus layer the state machine emits a
//! self-contained byte image of its entire state; restoring the image on
//! any replica reproduces that state exactly. Two replicas that applied the
//! same command prefix emit identical bytes, which is what lets the
//! consensus layer compare and ship snapshots for log compaction and
//! replica catch-up.
//!
//! - format: magic, header, section tags, structured corruption errors
//! - image: the decoded in-memory form ([`MachineImage`])
//! - encode: state → bytes (every collection written in its defined order)
//! - decode: bytes → state (total: every malformed input is a
//!   [`SnapshotError`], never a panic)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
pub mod encode;
pub mod format;
pub mod image;

pub use decode::decode;
pub use encode::encode;
pub use format::{SnapshotError, SnapshotHeader, SNAPSHOT_FORMAT_VERSION, SNAPSHOT_MAGIC};
pub use image::MachineImage;
