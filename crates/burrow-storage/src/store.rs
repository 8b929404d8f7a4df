//! The in-memory content store: hash -> stored request.

use crate::hash::ContentHash;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Concurrent map from content hash to the request stored under it.
///
/// Validation sequences run inside [`DataStore::with_write`] so check-then-act
/// stays atomic; readers take point-in-time clones via [`DataStore::snapshot`]
/// and never observe concurrent mutation mid-iteration.
#[derive(Debug, Default)]
pub struct DataStore<T> {
    map: RwLock<HashMap<ContentHash, T>>,
}

impl<T: Clone> DataStore<T> {
    pub fn new() -> Self {
        Self { map: RwLock::new(HashMap::new()) }
    }

    /// Rebuild from a persisted snapshot, replacing current content.
    pub fn replace(&self, snapshot: HashMap<ContentHash, T>) {
        *self.map.write() = snapshot;
    }

    /// Clone of the entry under `hash`.
    pub fn get(&self, hash: &ContentHash) -> Option<T> {
        self.map.read().get(hash).cloned()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.map.read().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Point-in-time deep clone for iteration and persistence.
    pub fn snapshot(&self) -> HashMap<ContentHash, T> {
        self.map.read().clone()
    }

    /// Run `f` under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&HashMap<ContentHash, T>) -> R) -> R {
        f(&self.map.read())
    }

    /// Run `f` under the write lock; the whole closure is one atomic step
    /// with respect to other store operations.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut HashMap<ContentHash, T>) -> R) -> R {
        f(&mut self.map.write())
    }

    /// Remove and return every entry matching `predicate`.
    pub fn remove_where(&self, predicate: impl Fn(&ContentHash, &T) -> bool) -> Vec<(ContentHash, T)> {
        let mut map = self.map.write();
        let doomed: Vec<ContentHash> =
            map.iter().filter(|(hash, value)| predicate(hash, value)).map(|(hash, _)| *hash).collect();
        doomed
            .into_iter()
            .filter_map(|hash| map.remove(&hash).map(|value| (hash, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; 32])
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let store = DataStore::new();
        store.with_write(|map| map.insert(hash(1), "a"));
        let snapshot = store.snapshot();
        store.with_write(|map| map.insert(hash(2), "b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_where_returns_removed_entries() {
        let store = DataStore::new();
        store.with_write(|map| {
            map.insert(hash(1), 10u32);
            map.insert(hash(2), 20u32);
            map.insert(hash(3), 30u32);
        });
        let removed = store.remove_where(|_, value| *value >= 20);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&hash(1)));
    }
}
