//! Per-operation options
//!
//! Each struct carries one field per recognised option with its default
//! applied. Options an operation does not understand simply have no field.

use std::ops::Bound;

use crate::engine::RangeOptions;

/// Default page budget for cursors: 16 KiB of key+value bytes
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Options for reads that return no value (`is_exists`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Populate the read cache on a table hit (default true)
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { fill_cache: true }
    }
}

/// Options for `get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    /// Populate the read cache on a table hit (default true)
    pub fill_cache: bool,
    /// Return the value as raw bytes instead of text (default false)
    pub as_buffer: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            fill_cache: true,
            as_buffer: false,
        }
    }
}

/// Options for `multi_get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiGetOptions {
    pub fill_cache: bool,
    /// Return values as raw bytes instead of text (default false)
    pub as_buffer: bool,
    /// Echo each key before its value (default true)
    pub keys: bool,
    /// Fail the whole call on the first missing key (default true);
    /// when false a missing value is `None`
    pub raise_error: bool,
}

impl Default for MultiGetOptions {
    fn default() -> Self {
        Self {
            fill_cache: true,
            as_buffer: false,
            keys: true,
            raise_error: true,
        }
    }
}

/// Options for `get_buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetBufferOptions {
    pub fill_cache: bool,
    /// Where in the destination buffer the value is written (default 0)
    pub offset: usize,
}

impl Default for GetBufferOptions {
    fn default() -> Self {
        Self {
            fill_cache: true,
            offset: 0,
        }
    }
}

/// Options for `put`, `del` and batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// fsync the log before reporting success (default false)
    pub sync: bool,
}

/// Options for cursors
///
/// `start`/`end` are inclusive; with `reverse` set, `start` is the upper
/// end of the range and `end` the lower. `gt`/`gte`/`lt`/`lte` take
/// precedence over `start`/`end`. Empty bound keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorOptions {
    pub start: Option<Vec<u8>>,
    pub end: Option<Vec<u8>>,
    pub gt: Option<Vec<u8>>,
    pub gte: Option<Vec<u8>>,
    pub lt: Option<Vec<u8>>,
    pub lte: Option<Vec<u8>>,
    pub reverse: bool,
    /// `None` for unlimited
    pub limit: Option<usize>,
    /// Yield keys (default true); when false key slots are empty
    pub keys: bool,
    /// Yield values (default true); when false value slots are empty
    pub values: bool,
    /// Keys as raw bytes (default true) or lossy UTF-8 text
    pub key_as_buffer: bool,
    /// Values as raw bytes (default true) or lossy UTF-8 text
    pub value_as_buffer: bool,
    pub fill_cache: bool,
    /// Byte budget per page fetch (default 16 KiB)
    pub high_water_mark: usize,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            reverse: false,
            limit: None,
            keys: true,
            values: true,
            key_as_buffer: true,
            value_as_buffer: true,
            fill_cache: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl IteratorOptions {
    /// Reduce the option set to concrete engine bounds
    pub fn to_range(&self) -> RangeOptions {
        let key = |k: &Option<Vec<u8>>| k.clone().filter(|k| !k.is_empty());

        let exclusive_low = key(&self.gt).map(Bound::Excluded);
        let inclusive_low = key(&self.gte).map(Bound::Included);
        let exclusive_high = key(&self.lt).map(Bound::Excluded);
        let inclusive_high = key(&self.lte).map(Bound::Included);
        let start = key(&self.start).map(Bound::Included);
        let end = key(&self.end).map(Bound::Included);

        let (low_default, high_default) = if self.reverse { (end, start) } else { (start, end) };

        RangeOptions {
            lower: exclusive_low
                .or(inclusive_low)
                .or(low_default)
                .unwrap_or(Bound::Unbounded),
            upper: exclusive_high
                .or(inclusive_high)
                .or(high_default)
                .unwrap_or(Bound::Unbounded),
            reverse: self.reverse,
            limit: self.limit,
            keys: self.keys,
            values: self.values,
            fill_cache: self.fill_cache,
        }
    }
}
