//! The key directory (§4.D): a thread-safe map from key bytes to the index
//! entry for that key's most recent live record.

use crate::engine::file::Cursor;
use crate::engine::time::unix_millis;

use parking_lot::RwLock;
use std::collections::HashMap;

/// Enough to fetch and validate the live record for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub file_id: u64,
    pub created: i64,
    pub expired: i64,
    pub key: Vec<u8>,
    pub cursor: Cursor,
}

impl IndexEntry {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expired != 0 && self.expired <= now_millis
    }
}

pub struct KeyDir {
    table: RwLock<HashMap<Vec<u8>, IndexEntry>>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self { table: RwLock::new(HashMap::new()) }
    }

    /// A snapshot of every live, non-expired key. Expired entries are
    /// skipped but not evicted here; `find` evicts lazily on lookup.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let now = unix_millis();
        self.table
            .read()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Returns the entry for `key` if present and not expired. An expired
    /// entry is atomically evicted and reported absent.
    pub fn find(&self, key: &[u8]) -> Option<IndexEntry> {
        let now = unix_millis();

        {
            let table = self.table.read();
            match table.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.clone()),
                None => return None,
                Some(_) => {} // expired, fall through to evict under the write lock
            }
        }

        let mut table = self.table.write();
        if let Some(entry) = table.get(key) {
            if entry.is_expired_at(now) {
                table.remove(key);
            } else {
                return Some(entry.clone());
            }
        }
        None
    }

    /// Upserts `entry` by its key, overwriting any prior entry for the same
    /// key.
    pub fn insert(&self, entry: IndexEntry) {
        self.table.write().insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &[u8]) {
        self.table.write().remove(key);
    }

    pub fn clear(&self) {
        self.table.write().clear();
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &[u8], expired: i64) -> IndexEntry {
        IndexEntry {
            file_id: 1,
            created: 0,
            expired,
            key: key.to_vec(),
            cursor: Cursor { offset: 0, size: 10 },
        }
    }

    #[test]
    fn insert_then_find() {
        let dir = KeyDir::new();
        dir.insert(entry(b"k", 0));
        assert_eq!(dir.find(b"k").unwrap().key, b"k");
    }

    #[test]
    fn insert_overwrites() {
        let dir = KeyDir::new();
        dir.insert(entry(b"k", 0));
        let mut e2 = entry(b"k", 0);
        e2.created = 99;
        dir.insert(e2);
        assert_eq!(dir.find(b"k").unwrap().created, 99);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn remove_then_absent() {
        let dir = KeyDir::new();
        dir.insert(entry(b"k", 0));
        dir.remove(b"k");
        assert!(dir.find(b"k").is_none());
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let dir = KeyDir::new();
        dir.remove(b"missing");
        assert!(dir.is_empty());
    }

    #[test]
    fn find_evicts_expired_entry() {
        let dir = KeyDir::new();
        dir.insert(entry(b"k", 1)); // expired since epoch + 1ms is long past
        assert!(dir.find(b"k").is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn keys_skips_expired_without_evicting() {
        let dir = KeyDir::new();
        dir.insert(entry(b"live", 0));
        dir.insert(entry(b"dead", 1));
        assert_eq!(dir.keys(), vec![b"live".to_vec()]);
    }

    #[test]
    fn clear_drops_everything() {
        let dir = KeyDir::new();
        dir.insert(entry(b"a", 0));
        dir.insert(entry(b"b", 0));
        dir.clear();
        assert!(dir.is_empty());
    }

    #[test]
    fn keys_are_owned_copies() {
        let dir = KeyDir::new();
        dir.insert(entry(b"k", 0));
        let mut keys = dir.keys();
        keys[0].push(b'!');
        assert_eq!(dir.find(b"k").unwrap().key, b"k");
    }
}
