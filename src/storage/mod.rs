//! Storage Module
//!
//! Persistent storage layer built from immutable SSTables.
//!
//! ## Responsibilities
//! - Persist flushed MemTables to disk in sorted format
//! - Point lookups and ordered range probes across every table
//! - Read cache for hot point lookups
//! - Size estimates for key ranges

mod cache;
mod manager;
pub mod sstable;

use std::ops::Bound;

pub use cache::ReadCache;
pub use manager::StorageManager;
pub use sstable::{Lookup, SSTable, SSTableBuilder, SSTableIterator, SSTableReader};

/// Name of the directory holding SSTables inside a store location
pub const SSTABLE_DIR: &str = "sstables";

/// True if no key can satisfy both bounds
///
/// `BTreeMap::range` panics on inverted bounds, so every range probe checks
/// this first.
pub fn range_is_empty(lo: Bound<&[u8]>, hi: Bound<&[u8]>) -> bool {
    use Bound::*;
    match (lo, hi) {
        (Unbounded, _) | (_, Unbounded) => false,
        (Included(a), Included(b)) => a > b,
        (Included(a), Excluded(b)) | (Excluded(a), Included(b)) | (Excluded(a), Excluded(b)) => {
            a >= b
        }
    }
}
