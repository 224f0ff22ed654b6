//! Snapshot decoding: bytes → state
//!
//! Decoding is total. Every read goes through a bounds-checked cursor and
//! every structural violation (truncation, unknown tags, out-of-order
//! collections, trailing bytes) maps to a [`SnapshotError`]. A decoded
//! image is therefore fully validated: re-encoding it reproduces the input
//! byte-for-byte.

use crate::format::{
    section_tags, state_tags, update_tags, SnapshotError, SnapshotHeader, SNAPSHOT_HEADER_SIZE,
};
use crate::image::MachineImage;
use lockstep_concurrency::{MapUpdate, TransactionRecord, TransactionState};
use lockstep_core::{Key, SessionId, Timestamp, TransactionId};
use lockstep_storage::MapEntry;

/// Decode a snapshot image from its canonical byte form
pub fn decode(bytes: &[u8]) -> Result<MachineImage, SnapshotError> {
    let mut reader = Reader::new(bytes);

    let header_bytes: [u8; SNAPSHOT_HEADER_SIZE] = reader
        .read_exact(SNAPSHOT_HEADER_SIZE)?
        .try_into()
        .expect("read_exact returned requested length");
    let header = SnapshotHeader::from_bytes(&header_bytes);
    header.validate()?;

    let entries = parse_section(&mut reader, section_tags::ENTRIES, parse_entries)?;
    let ttl_nodes = parse_section(&mut reader, section_tags::TTL, parse_ttl)?;
    let transactions = parse_section(&mut reader, section_tags::TRANSACTIONS, parse_transactions)?;
    let listeners = parse_section(&mut reader, section_tags::LISTENERS, parse_listeners)?;

    if reader.remaining() > 0 {
        return Err(SnapshotError::TrailingBytes(reader.remaining()));
    }

    Ok(MachineImage {
        version_counter: header.version_counter,
        clock: Timestamp::from_millis(header.clock),
        last_index: header.last_index,
        entries,
        ttl_nodes,
        transactions,
        listeners,
    })
}

/// Read one section frame and hand its exact payload to `parse`
fn parse_section<T>(
    reader: &mut Reader<'_>,
    expected_tag: u8,
    parse: impl FnOnce(&mut Reader<'_>) -> Result<T, SnapshotError>,
) -> Result<T, SnapshotError> {
    let tag = reader.read_u8()?;
    if tag != expected_tag {
        return Err(SnapshotError::UnexpectedSection {
            expected: expected_tag,
            actual: tag,
        });
    }
    let data_len = reader.read_u64()?;
    let payload = reader.read_exact_u64(data_len)?;
    let mut section_reader = Reader::new(payload);
    let value = parse(&mut section_reader)?;
    if section_reader.remaining() > 0 {
        return Err(SnapshotError::SectionLengthMismatch { tag: expected_tag });
    }
    Ok(value)
}

fn parse_entries(reader: &mut Reader<'_>) -> Result<Vec<(Key, MapEntry)>, SnapshotError> {
    let count = reader.read_u32()? as usize;
    let mut entries = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let key = reader.read_key()?;
        let value = reader.read_bytes()?.to_vec();
        let version = reader.read_u64()?;
        let created = Timestamp::from_millis(reader.read_u64()?);
        let ttl_millis = reader.read_u64()?;
        if let Some((last_key, _)) = entries.last() {
            if *last_key >= key {
                return Err(SnapshotError::Unsorted("entries"));
            }
        }
        entries.push((key, MapEntry::new(value, version, created, ttl_millis)));
    }
    Ok(entries)
}

fn parse_ttl(reader: &mut Reader<'_>) -> Result<Vec<(Timestamp, Key)>, SnapshotError> {
    let count = reader.read_u32()? as usize;
    let mut nodes: Vec<(Timestamp, Key)> = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let expiry = Timestamp::from_millis(reader.read_u64()?);
        let key = reader.read_key()?;
        if let Some(last) = nodes.last() {
            if *last >= (expiry, key.clone()) {
                return Err(SnapshotError::Unsorted("ttl-index"));
            }
        }
        nodes.push((expiry, key));
    }
    Ok(nodes)
}

fn parse_transactions(reader: &mut Reader<'_>) -> Result<Vec<TransactionRecord>, SnapshotError> {
    let count = reader.read_u32()? as usize;
    let mut records: Vec<TransactionRecord> = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let id = TransactionId::new(reader.read_u64()?);
        let session = SessionId::new(reader.read_u64()?);
        let state = match reader.read_u8()? {
            state_tags::ACTIVE => TransactionState::Active,
            state_tags::PREPARED => TransactionState::Prepared,
            state_tags::COMMITTED => TransactionState::Committed,
            state_tags::ROLLED_BACK => TransactionState::RolledBack,
            tag => {
                return Err(SnapshotError::InvalidTag {
                    what: "transaction state",
                    tag,
                })
            }
        };
        let start_version = reader.read_u64()?;
        let update_count = reader.read_u32()? as usize;
        let mut prepared = Vec::with_capacity(update_count.min(4096));
        for _ in 0..update_count {
            prepared.push(parse_update(reader)?);
        }
        if let Some(last) = records.last() {
            if last.id >= id {
                return Err(SnapshotError::Unsorted("transactions"));
            }
        }
        records.push(TransactionRecord {
            id,
            session,
            state,
            start_version,
            prepared,
        });
    }
    Ok(records)
}

fn parse_update(reader: &mut Reader<'_>) -> Result<MapUpdate, SnapshotError> {
    match reader.read_u8()? {
        update_tags::PUT => {
            let key = reader.read_key()?;
            let value = reader.read_bytes()?.to_vec();
            let expected_version = reader.read_optional_u64()?;
            Ok(MapUpdate::Put {
                key,
                value,
                expected_version,
            })
        }
        update_tags::REMOVE => {
            let key = reader.read_key()?;
            let expected_version = reader.read_optional_u64()?;
            Ok(MapUpdate::Remove {
                key,
                expected_version,
            })
        }
        update_tags::LOCK => {
            let key = reader.read_key()?;
            let expected_version = reader.read_u64()?;
            Ok(MapUpdate::Lock {
                key,
                expected_version,
            })
        }
        tag => Err(SnapshotError::InvalidTag {
            what: "update",
            tag,
        }),
    }
}

fn parse_listeners(reader: &mut Reader<'_>) -> Result<Vec<SessionId>, SnapshotError> {
    let count = reader.read_u32()? as usize;
    let mut sessions: Vec<SessionId> = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let session = SessionId::new(reader.read_u64()?);
        if let Some(last) = sessions.last() {
            if *last >= session {
                return Err(SnapshotError::Unsorted("listeners"));
            }
        }
        sessions.push(session);
    }
    Ok(sessions)
}

/// Bounds-checked cursor over the input bytes
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        if self.remaining() < len {
            return Err(SnapshotError::Truncated {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_exact_u64(&mut self, len: u64) -> Result<&'a [u8], SnapshotError> {
        if (self.remaining() as u64) < len {
            return Err(SnapshotError::Truncated {
                offset: self.pos,
                needed: (len - self.remaining() as u64) as usize,
            });
        }
        self.read_exact(len as usize)
    }

    fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, SnapshotError> {
        let slice = self.read_exact(4)?;
        Ok(u32::from_le_bytes(
            slice.try_into().expect("read_exact returned 4 bytes"),
        ))
    }

    fn read_u64(&mut self) -> Result<u64, SnapshotError> {
        let slice = self.read_exact(8)?;
        Ok(u64::from_le_bytes(
            slice.try_into().expect("read_exact returned 8 bytes"),
        ))
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], SnapshotError> {
        let len = self.read_u32()? as usize;
        self.read_exact(len)
    }

    fn read_key(&mut self) -> Result<Key, SnapshotError> {
        let raw = self.read_bytes()?;
        let s = std::str::from_utf8(raw).map_err(|_| SnapshotError::InvalidString)?;
        Ok(Key::from(s))
    }

    fn read_optional_u64(&mut self) -> Result<Option<u64>, SnapshotError> {
        match self.read_u8()? {
            0x00 => Ok(None),
            0x01 => Ok(Some(self.read_u64()?)),
            tag => Err(SnapshotError::InvalidTag {
                what: "optional",
                tag,
            }),
        }
    }
}
