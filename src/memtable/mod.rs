//! MemTable Module
//!
//! In-memory buffer for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Atomic application of write batches
//! - Track size for flush triggers
//! - Cheap point-in-time snapshots for iterators
//!
//! ## Data Structure Choice
//! A BTreeMap behind an `Arc`, swapped copy-on-write under a RwLock:
//! - Ordered keys (required for SSTable generation and range scans)
//! - A snapshot is an `Arc` clone; writers only copy the map while a
//!   snapshot is still alive

mod table;

pub use table::{MemTable, Snapshot};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Bytes this entry contributes beyond its key
    pub(crate) fn payload_len(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}
