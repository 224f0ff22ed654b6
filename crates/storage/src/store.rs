//! Primary entry store
//!
//! Single ordered mapping from key to [`MapEntry`], with the TTL index kept
//! in sync by construction: every mutation goes through `apply_write`,
//! `apply_remove`, or `drain_expired`, each of which updates both structures.
//!
//! Reads hand out defensive copies. Callers never receive live views into
//! the store; mutating a returned collection cannot affect replicated state.

use crate::entry::MapEntry;
use crate::ttl::TtlIndex;
use lockstep_core::{Error, Key, Result, Timestamp, Versioned};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Ordered key → entry mapping with embedded TTL index
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryStore {
    entries: BTreeMap<Key, MapEntry>,
    ttl: TtlIndex,
}

impl EntryStore {
    /// Create an empty store
    pub fn new() -> Self {
        EntryStore {
            entries: BTreeMap::new(),
            ttl: TtlIndex::new(),
        }
    }

    // ========== Reads (defensive copies) ==========

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` currently has an entry
    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether any entry's payload equals `value` byte-for-byte.
    ///
    /// Linear scan; the map has no value index.
    pub fn contains_value(&self, value: &[u8]) -> bool {
        self.entries.values().any(|entry| entry.value == value)
    }

    /// Borrow the entry for `key`
    pub fn get(&self, key: &Key) -> Option<&MapEntry> {
        self.entries.get(key)
    }

    /// Client-visible versioned view of `key`
    pub fn get_versioned(&self, key: &Key) -> Option<Versioned> {
        self.entries.get(key).map(MapEntry::versioned)
    }

    /// Current version of `key`, with 0 meaning absent.
    ///
    /// This is the value compare-and-set preconditions are checked against;
    /// the counter never mints 0, so "expected 0" asserts absence.
    pub fn current_version(&self, key: &Key) -> u64 {
        self.entries.get(key).map(|entry| entry.version).unwrap_or(0)
    }

    /// Versioned views for every requested key that is present, in
    /// ascending key order
    pub fn get_all_present<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a Key>,
    ) -> Vec<(Key, Versioned)> {
        let requested: BTreeSet<&Key> = keys.into_iter().collect();
        requested
            .into_iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|entry| (key.clone(), entry.versioned()))
            })
            .collect()
    }

    /// All keys in ascending order
    pub fn keys(&self) -> Vec<Key> {
        self.entries.keys().cloned().collect()
    }

    /// All versioned values in ascending key order
    pub fn values(&self) -> Vec<Versioned> {
        self.entries.values().map(MapEntry::versioned).collect()
    }

    /// All `(key, versioned)` pairs in ascending key order
    pub fn entries(&self) -> Vec<(Key, Versioned)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.versioned()))
            .collect()
    }

    // ========== Writes ==========

    /// Write `key`, replacing any previous entry, and return the old one.
    ///
    /// The previous TTL node (if any) is dropped; a new one is added at
    /// `now + ttl_millis` when `ttl_millis > 0`. Callers are responsible for
    /// having minted `version` and for not calling this on a non-effect.
    pub fn apply_write(
        &mut self,
        key: Key,
        value: Vec<u8>,
        ttl_millis: u64,
        version: u64,
        now: Timestamp,
    ) -> Option<MapEntry> {
        let entry = MapEntry::new(value, version, now, ttl_millis);
        if let Some(expiry) = entry.expires_at() {
            self.ttl.insert(expiry, key.clone());
        }
        let old = self.entries.insert(key.clone(), entry);
        if let Some(expiry) = old.as_ref().and_then(MapEntry::expires_at) {
            // Old and new nodes can share a bucket only if the expiries
            // differ; equal expiries were overwritten by the insert above.
            if Some(expiry)
                != self
                    .entries
                    .get(&key)
                    .and_then(MapEntry::expires_at)
            {
                self.ttl.remove(expiry, &key);
            }
        }
        old
    }

    /// Remove `key` and its TTL node, returning the old entry
    pub fn apply_remove(&mut self, key: &Key) -> Option<MapEntry> {
        let old = self.entries.remove(key)?;
        if let Some(expiry) = old.expires_at() {
            self.ttl.remove(expiry, key);
        }
        Some(old)
    }

    /// Remove and return every entry expired at `now`, except keys in
    /// `skip`, in ascending `(expiry, key)` order
    pub fn drain_expired(&mut self, now: Timestamp, skip: &BTreeSet<Key>) -> Vec<(Key, MapEntry)> {
        let drained = self.ttl.drain_expired(now, skip);
        if !drained.is_empty() {
            debug!(count = drained.len(), now = now.as_millis(), "expiring entries");
        }
        drained
            .into_iter()
            .filter_map(|(_, key)| {
                let entry = self.entries.remove(&key)?;
                Some((key, entry))
            })
            .collect()
    }

    // ========== Snapshot support ==========

    /// Iterate entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &MapEntry)> {
        self.entries.iter()
    }

    /// All TTL nodes in ascending `(expiry, key)` order
    pub fn ttl_nodes(&self) -> Vec<(Timestamp, Key)> {
        self.ttl
            .iter()
            .map(|(expiry, key)| (expiry, key.clone()))
            .collect()
    }

    /// Rebuild a store from snapshot sections.
    ///
    /// The TTL section must agree with the entries section: one node per
    /// entry with a TTL, at that entry's expiry. Disagreement means the
    /// image is corrupt.
    pub fn from_parts(
        entries: Vec<(Key, MapEntry)>,
        ttl_nodes: Vec<(Timestamp, Key)>,
    ) -> Result<Self> {
        let mut store = EntryStore::new();
        let mut expected_nodes = 0usize;
        for (key, entry) in entries {
            if let Some(expiry) = entry.expires_at() {
                expected_nodes += 1;
                store.ttl.insert(expiry, key.clone());
            }
            store.entries.insert(key, entry);
        }
        if ttl_nodes.len() != expected_nodes {
            return Err(Error::SnapshotCorrupt(format!(
                "ttl index has {} nodes, entries imply {}",
                ttl_nodes.len(),
                expected_nodes
            )));
        }
        for (expiry, key) in ttl_nodes {
            let matches = store
                .entries
                .get(&key)
                .and_then(MapEntry::expires_at)
                .map(|e| e == expiry)
                .unwrap_or(false);
            if !matches {
                return Err(Error::SnapshotCorrupt(format!(
                    "ttl node ({}, {}) does not match any entry",
                    expiry.as_millis(),
                    key
                )));
            }
        }
        Ok(store)
    }
}
