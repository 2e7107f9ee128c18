//! Engine Module
//!
//! The boundary between the façade and a storage engine.
//!
//! A store is reached only through an [`EngineHandle`]: an owned, opened
//! instance bound to one location. Range reads go through a
//! [`NativeIterator`] that hands back pages of entries. Optional bulk
//! capabilities are separate traits so the façade can require them at
//! compile time.
//!
//! [`AtlasEngine`] is the bundled implementation (WAL + MemTable +
//! SSTables).

mod atlas;
mod iterator;

use std::ops::Bound;
use std::path::Path;

use crate::config::Config;
use crate::error::Result;

pub use atlas::{AtlasEngine, EngineStats, WAL_FILENAME};
pub use iterator::AtlasIterator;

/// A single write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Del { key } => key,
        }
    }
}

/// Fully resolved range request handed to [`EngineHandle::iterator`]
#[derive(Debug, Clone)]
pub struct RangeOptions {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
    pub reverse: bool,
    /// `None` means unlimited
    pub limit: Option<usize>,
    /// When false, key slots in pages are empty
    pub keys: bool,
    /// When false, value slots in pages are empty
    pub values: bool,
    pub fill_cache: bool,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            reverse: false,
            limit: None,
            keys: true,
            values: true,
            fill_cache: true,
        }
    }
}

/// One fetch worth of entries
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Page {
    /// Alternating key, value, key, value... in range order
    pub entries: Vec<Vec<u8>>,
    /// True once the iterator has nothing beyond this page
    pub finished: bool,
}

impl Page {
    /// Number of key/value pairs carried
    pub fn len(&self) -> usize {
        self.entries.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An opened store instance
///
/// Implementations must be safe for concurrent use: any number of reads,
/// writes and iterators may run at once from different threads.
pub trait EngineHandle: Send + Sync + Sized + 'static {
    type Iter: NativeIterator;

    /// Open (or create) the store at `location`
    fn open(location: &Path, config: &Config) -> Result<Self>;

    /// Flush buffered state; the handle is dropped afterwards
    fn close(&self) -> Result<()>;

    /// `Ok(None)` when the key is absent
    fn get(&self, key: &[u8], fill_cache: bool) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<()>;

    fn delete(&self, key: &[u8], sync: bool) -> Result<()>;

    /// Apply every op or none of them
    fn write_batch(&self, ops: Vec<BatchOp>, sync: bool) -> Result<()>;

    /// Create an iterator over a snapshot of the store
    fn iterator(&self, range: RangeOptions) -> Result<Self::Iter>;

    /// Approximate on-disk bytes used by keys in `[start, end]`
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64>;

    /// Engine introspection; unknown names yield an empty string
    fn property(&self, name: &str) -> String;
}

/// Engine-side iteration handle
pub trait NativeIterator: Send + 'static {
    /// Fetch the next page
    ///
    /// Entries accumulate until their key+value bytes exceed
    /// `high_water_mark`, so a non-finished page is never empty.
    fn next_page(&mut self, high_water_mark: usize) -> Result<Page>;

    /// Reposition at the first entry at or past `target` in range order
    fn seek(&mut self, target: &[u8]);

    /// Drop any resources pinned by the iterator
    fn release(&mut self);
}

/// Engines that can resolve many keys in one call
pub trait SupportsBulkGet: EngineHandle {
    /// One slot per key, in order; `None` for absent keys
    fn multi_get(&self, keys: &[Vec<u8>], fill_cache: bool) -> Result<Vec<Option<Vec<u8>>>>;
}

/// Engines that can copy a value straight into a caller buffer
pub trait SupportsBufferRead: EngineHandle {
    /// Copy the value of `key` into the front of `dest`
    ///
    /// Returns the bytes written, `NotFound` for an absent key and
    /// `BufferTooSmall` when the value does not fit.
    fn get_into(&self, key: &[u8], dest: &mut [u8], fill_cache: bool) -> Result<usize>;
}
