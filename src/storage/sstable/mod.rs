//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "ATDN" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | Padding (4) │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::{Lookup, SSTableReader};

/// Magic bytes identifying an SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"ATDN";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Magic (4) + Version (2) + EntryCount (8)
pub(crate) const HEADER_SIZE: u64 = 14;

/// IndexOffset (8) + DataCRC (4) + Padding (4)
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Value length marking a tombstone
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Summary of a finished SSTable file
#[derive(Debug, Clone)]
pub struct SSTable {
    pub path: PathBuf,
    pub entry_count: u64,
    /// Smallest key (empty for an empty table)
    pub min_key: Vec<u8>,
    /// Largest key (empty for an empty table)
    pub max_key: Vec<u8>,
    pub file_size: u64,
}

impl SSTable {
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }
}

/// Decode the fixed 8-byte `[KeyLen][ValLen]` prefix of a data entry
pub(crate) fn entry_lengths(prefix: &[u8; 8]) -> (usize, u32) {
    let mut key_len = [0u8; 4];
    key_len.copy_from_slice(&prefix[0..4]);
    let mut val_len = [0u8; 4];
    val_len.copy_from_slice(&prefix[4..8]);
    (u32::from_le_bytes(key_len) as usize, u32::from_le_bytes(val_len))
}
