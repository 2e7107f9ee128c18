//! MemTable implementation
//!
//! Copy-on-write BTreeMap with a parking_lot RwLock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::MemTableEntry;
use crate::wal::Operation;

/// Frozen view of the table at one instant
pub type Snapshot = Arc<BTreeMap<Vec<u8>, MemTableEntry>>;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<Snapshot>,
    /// Sum of key and value lengths (tombstones count their key)
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Arc::new(BTreeMap::new())),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry stored for a key, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let mut data = self.data.write();
        self.insert(Arc::make_mut(&mut data), key, MemTableEntry::Value(value));
    }

    /// Delete a key (inserts a tombstone)
    pub fn delete(&self, key: Vec<u8>) {
        let mut data = self.data.write();
        self.insert(Arc::make_mut(&mut data), key, MemTableEntry::Tombstone);
    }

    /// Apply a logged operation under a single write lock
    ///
    /// Readers observe either none or all of a batch.
    pub fn apply(&self, operation: Operation) {
        let mut data = self.data.write();
        let map = Arc::make_mut(&mut data);
        self.apply_into(map, operation);
    }

    fn apply_into(&self, map: &mut BTreeMap<Vec<u8>, MemTableEntry>, operation: Operation) {
        match operation {
            Operation::Put { key, value } => self.insert(map, key, MemTableEntry::Value(value)),
            Operation::Delete { key } => self.insert(map, key, MemTableEntry::Tombstone),
            Operation::Batch { ops } => {
                for op in ops {
                    self.apply_into(map, op);
                }
            }
        }
    }

    fn insert(&self, map: &mut BTreeMap<Vec<u8>, MemTableEntry>, key: Vec<u8>, entry: MemTableEntry) {
        let key_len = key.len();
        let payload = entry.payload_len();
        match map.insert(key, entry) {
            Some(old) => {
                self.size.fetch_add(payload, Ordering::Relaxed);
                self.size.fetch_sub(old.payload_len(), Ordering::Relaxed);
            }
            None => {
                self.size.fetch_add(key_len + payload, Ordering::Relaxed);
            }
        }
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Number of keys held, tombstones included
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if the table has reached the flush threshold
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Point-in-time view; later writes never show through it
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.data.read())
    }

    /// Owned copy of every entry in key order (for flush)
    pub fn iter(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.snapshot()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = Arc::new(BTreeMap::new());
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
