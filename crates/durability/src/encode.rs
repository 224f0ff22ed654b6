//! Snapshot encoding: state → bytes
//!
//! The encoder trusts its input's sort order (the image is built from
//! BTree walks) and writes each section as tag, length, payload. The
//! decoder re-checks the ordering, so a hand-built unsorted image fails to
//! round-trip rather than silently diverging.

use crate::format::{section_tags, state_tags, update_tags, SnapshotHeader};
use crate::image::MachineImage;
use lockstep_concurrency::{MapUpdate, TransactionRecord, TransactionState};

/// Encode a machine image into its canonical byte form
pub fn encode(image: &MachineImage) -> Vec<u8> {
    let mut bytes = Vec::new();

    let header = SnapshotHeader::new(
        image.version_counter,
        image.clock.as_millis(),
        image.last_index,
    );
    bytes.extend_from_slice(&header.to_bytes());

    write_section(&mut bytes, section_tags::ENTRIES, encode_entries(image));
    write_section(&mut bytes, section_tags::TTL, encode_ttl(image));
    write_section(
        &mut bytes,
        section_tags::TRANSACTIONS,
        encode_transactions(image),
    );
    write_section(&mut bytes, section_tags::LISTENERS, encode_listeners(image));

    bytes
}

fn write_section(bytes: &mut Vec<u8>, tag: u8, payload: Vec<u8>) {
    bytes.push(tag);
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
}

fn encode_entries(image: &MachineImage) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(image.entries.len() as u32).to_le_bytes());
    for (key, entry) in &image.entries {
        write_bytes(&mut payload, key.as_bytes());
        write_bytes(&mut payload, &entry.value);
        payload.extend_from_slice(&entry.version.to_le_bytes());
        payload.extend_from_slice(&entry.created.as_millis().to_le_bytes());
        payload.extend_from_slice(&entry.ttl_millis.to_le_bytes());
    }
    payload
}

fn encode_ttl(image: &MachineImage) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(image.ttl_nodes.len() as u32).to_le_bytes());
    for (expiry, key) in &image.ttl_nodes {
        payload.extend_from_slice(&expiry.as_millis().to_le_bytes());
        write_bytes(&mut payload, key.as_bytes());
    }
    payload
}

fn encode_transactions(image: &MachineImage) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(image.transactions.len() as u32).to_le_bytes());
    for record in &image.transactions {
        write_record(&mut payload, record);
    }
    payload
}

fn write_record(payload: &mut Vec<u8>, record: &TransactionRecord) {
    payload.extend_from_slice(&record.id.as_u64().to_le_bytes());
    payload.extend_from_slice(&record.session.as_u64().to_le_bytes());
    payload.push(match record.state {
        TransactionState::Active => state_tags::ACTIVE,
        TransactionState::Prepared => state_tags::PREPARED,
        TransactionState::Committed => state_tags::COMMITTED,
        TransactionState::RolledBack => state_tags::ROLLED_BACK,
    });
    payload.extend_from_slice(&record.start_version.to_le_bytes());
    payload.extend_from_slice(&(record.prepared.len() as u32).to_le_bytes());
    for update in &record.prepared {
        write_update(payload, update);
    }
}

fn write_update(payload: &mut Vec<u8>, update: &MapUpdate) {
    match update {
        MapUpdate::Put {
            key,
            value,
            expected_version,
        } => {
            payload.push(update_tags::PUT);
            write_bytes(payload, key.as_bytes());
            write_bytes(payload, value);
            write_optional_u64(payload, *expected_version);
        }
        MapUpdate::Remove {
            key,
            expected_version,
        } => {
            payload.push(update_tags::REMOVE);
            write_bytes(payload, key.as_bytes());
            write_optional_u64(payload, *expected_version);
        }
        MapUpdate::Lock {
            key,
            expected_version,
        } => {
            payload.push(update_tags::LOCK);
            write_bytes(payload, key.as_bytes());
            payload.extend_from_slice(&expected_version.to_le_bytes());
        }
    }
}

fn encode_listeners(image: &MachineImage) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(image.listeners.len() as u32).to_le_bytes());
    for session in &image.listeners {
        payload.extend_from_slice(&session.as_u64().to_le_bytes());
    }
    payload
}

fn write_bytes(payload: &mut Vec<u8>, data: &[u8]) {
    payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
    payload.extend_from_slice(data);
}

fn write_optional_u64(payload: &mut Vec<u8>, value: Option<u64>) {
    match value {
        None => payload.push(0x00),
        Some(v) => {
            payload.push(0x01);
            payload.extend_from_slice(&v.to_le_bytes());
        }
    }
}
