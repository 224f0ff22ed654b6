//! TTL index for deterministic expiration
//!
//! Maps expiry timestamp → keys expiring at that time, using BTree
//! containers throughout so that drains yield ascending `(expiry, key)`
//! order on every replica. An entry with `ttl > 0` has exactly one node
//! here; re-writing or removing the entry removes the node.

use lockstep_core::{Key, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// TTL index: expiry timestamp → keys
///
/// Finding everything expired at time `now` is a range scan over
/// `..=now`, O(expired count) rather than O(total entries).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TtlIndex {
    index: BTreeMap<Timestamp, BTreeSet<Key>>,
}

impl TtlIndex {
    /// Create an empty index
    pub fn new() -> Self {
        TtlIndex {
            index: BTreeMap::new(),
        }
    }

    /// Add a node for `key` expiring at `expiry`
    pub fn insert(&mut self, expiry: Timestamp, key: Key) {
        self.index.entry(expiry).or_default().insert(key);
    }

    /// Remove the node for `key` at `expiry`, if present
    ///
    /// Used when a key is deleted or overwritten. An emptied timestamp
    /// bucket is removed entirely.
    pub fn remove(&mut self, expiry: Timestamp, key: &Key) {
        if let Some(keys) = self.index.get_mut(&expiry) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&expiry);
            }
        }
    }

    /// Remove and return all nodes with expiry ≤ `now`, except keys in
    /// `skip`, in ascending `(expiry, key)` order.
    ///
    /// Skipped keys keep their nodes; a later drain re-examines them. The
    /// state machine skips write-locked keys so a prepared transaction's
    /// validated view cannot be mutated underneath it.
    pub fn drain_expired(&mut self, now: Timestamp, skip: &BTreeSet<Key>) -> Vec<(Timestamp, Key)> {
        let mut drained = Vec::new();
        let expired_buckets: Vec<Timestamp> =
            self.index.range(..=now).map(|(ts, _)| *ts).collect();

        for expiry in expired_buckets {
            let Some(keys) = self.index.get_mut(&expiry) else {
                continue;
            };
            let due: Vec<Key> = keys
                .iter()
                .filter(|key| !skip.contains(*key))
                .cloned()
                .collect();
            for key in due {
                keys.remove(&key);
                drained.push((expiry, key));
            }
            if keys.is_empty() {
                self.index.remove(&expiry);
            }
        }

        drained
    }

    /// Iterate all nodes in ascending `(expiry, key)` order
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &Key)> {
        self.index
            .iter()
            .flat_map(|(expiry, keys)| keys.iter().map(move |key| (*expiry, key)))
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.index.values().map(|keys| keys.len()).sum()
    }

    /// Whether the index holds no nodes
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop all nodes
    pub fn clear(&mut self) {
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::from(s)
    }

    fn no_skip() -> BTreeSet<Key> {
        BTreeSet::new()
    }

    #[test]
    fn test_drain_returns_ascending_expiry_then_key() {
        let mut index = TtlIndex::new();
        index.insert(Timestamp::from_millis(500), key("b"));
        index.insert(Timestamp::from_millis(500), key("a"));
        index.insert(Timestamp::from_millis(200), key("z"));
        index.insert(Timestamp::from_millis(900), key("c"));

        let drained = index.drain_expired(Timestamp::from_millis(600), &no_skip());
        let order: Vec<(u64, &str)> = drained
            .iter()
            .map(|(ts, k)| (ts.as_millis(), k.as_str()))
            .collect();
        assert_eq!(order, vec![(200, "z"), (500, "a"), (500, "b")]);

        // The node at 900 is untouched
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_drain_skips_locked_keys_and_retains_nodes() {
        let mut index = TtlIndex::new();
        index.insert(Timestamp::from_millis(100), key("locked"));
        index.insert(Timestamp::from_millis(100), key("free"));

        let skip: BTreeSet<Key> = [key("locked")].into_iter().collect();
        let drained = index.drain_expired(Timestamp::from_millis(100), &skip);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1, key("free"));

        // The skipped node survives for a later drain
        let drained = index.drain_expired(Timestamp::from_millis(100), &no_skip());
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1, key("locked"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_cleans_empty_buckets() {
        let mut index = TtlIndex::new();
        index.insert(Timestamp::from_millis(100), key("a"));
        index.insert(Timestamp::from_millis(100), key("b"));

        index.remove(Timestamp::from_millis(100), &key("a"));
        assert_eq!(index.len(), 1);

        index.remove(Timestamp::from_millis(100), &key("b"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_drain_on_empty_index() {
        let mut index = TtlIndex::new();
        assert!(index
            .drain_expired(Timestamp::from_millis(1000), &no_skip())
            .is_empty());
    }

    #[test]
    fn test_nothing_expired_before_deadline() {
        let mut index = TtlIndex::new();
        index.insert(Timestamp::from_millis(2000), key("future"));
        assert!(index
            .drain_expired(Timestamp::from_millis(1999), &no_skip())
            .is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_iter_order_matches_drain_order() {
        let mut index = TtlIndex::new();
        index.insert(Timestamp::from_millis(300), key("b"));
        index.insert(Timestamp::from_millis(100), key("c"));
        index.insert(Timestamp::from_millis(300), key("a"));

        let iterated: Vec<(u64, String)> = index
            .iter()
            .map(|(ts, k)| (ts.as_millis(), k.as_str().to_string()))
            .collect();
        let drained: Vec<(u64, String)> = index
            .drain_expired(Timestamp::MAX, &no_skip())
            .into_iter()
            .map(|(ts, k)| (ts.as_millis(), k.into_string()))
            .collect();
        assert_eq!(iterated, drained);
    }
}
