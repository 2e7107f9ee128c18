//! Storage Manager
//!
//! Owns the set of SSTables of one store and coordinates reads and flushes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads, through the read cache
//! - Create new SSTables from MemTable flushes
//! - Hand out table snapshots to iterators

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AtlasError, Result};
use crate::memtable::{MemTable, MemTableEntry};

use super::{Lookup, ReadCache, SSTable, SSTableBuilder, SSTableReader};

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: RwLock, held only long enough to clone the list
/// - `next_sstable_id`: atomic counter
/// - readers lock their own file handle, so lookups run in parallel
pub struct StorageManager {
    data_dir: PathBuf,

    /// Open tables with their ids, newest first
    sstables: RwLock<Vec<(u64, Arc<SSTableReader>)>>,

    next_sstable_id: AtomicU64,

    cache: ReadCache,
}

impl StorageManager {
    /// Open or create storage in `path`
    ///
    /// Every `sstable_NNNNNN.sst` file is opened (loading its index); other
    /// files are ignored.
    pub fn open(path: &Path, cache_size: usize) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut ids = Self::discover(path)?;
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(ids.len());
        for &id in &ids {
            let reader = SSTableReader::open(&Self::sstable_path(path, id))?;
            sstables.push((id, Arc::new(reader)));
        }

        let next_id = ids.first().map(|&id| id + 1).unwrap_or(1);
        tracing::debug!(dir = %path.display(), tables = ids.len(), next_id, "storage opened");

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            cache: ReadCache::new(cache_size),
        })
    }

    /// Ids of every SSTable file in `dir`, unordered
    pub fn discover(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&path) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Get a value by key, newest table first
    ///
    /// `Ok(None)` covers both a missing key and a tombstone. With
    /// `fill_cache` false the lookup reads through the cache without
    /// populating it.
    pub fn get(&self, key: &[u8], fill_cache: bool) -> Result<Option<Vec<u8>>> {
        let tables = self.sstables.read().clone();

        for (id, reader) in tables.iter() {
            if !reader.might_contain(key) {
                continue;
            }
            if let Some(cached) = self.cache.get(*id, key) {
                return Ok(cached);
            }
            let found = match reader.get(key)? {
                Lookup::Found(value) => Some(value),
                Lookup::Deleted => None,
                Lookup::Absent => continue,
            };
            if fill_cache {
                self.cache.insert(*id, key.to_vec(), found.clone());
            }
            return Ok(found);
        }

        Ok(None)
    }

    /// Write the MemTable's contents to a new SSTable
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        let snapshot = memtable.snapshot();
        if snapshot.is_empty() {
            return Err(AtlasError::Storage("cannot flush empty MemTable".to_string()));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = Self::sstable_path(&self.data_dir, id);

        let mut builder = SSTableBuilder::new(&path)?;
        for (key, entry) in snapshot.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(key, v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(key)?,
            }
        }
        let metadata = builder.finish()?;
        let reader = SSTableReader::open(&path)?;

        self.sstables.write().insert(0, (id, Arc::new(reader)));
        tracing::info!(
            table = %path.display(),
            entries = metadata.entry_count,
            bytes = metadata.file_size,
            "memtable flushed"
        );
        Ok(metadata)
    }

    /// Current tables, newest first
    pub fn readers(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables.read().iter().map(|(_, r)| Arc::clone(r)).collect()
    }

    /// Approximate on-disk bytes used by keys in `[start, end)`
    pub fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64 {
        if start >= end {
            return 0;
        }
        self.sstables
            .read()
            .iter()
            .map(|(_, r)| {
                r.approximate_offset(end)
                    .saturating_sub(r.approximate_offset(start))
            })
            .sum()
    }

    /// One line per table: name, entries, bytes, key span
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (id, r) in self.sstables.read().iter() {
            let _ = writeln!(
                out,
                "sstable_{:06}.sst entries={} bytes={} keys=[{} .. {}]",
                id,
                r.entry_count(),
                r.file_size(),
                String::from_utf8_lossy(r.min_key().unwrap_or_default()),
                String::from_utf8_lossy(r.max_key().unwrap_or_default()),
            );
        }
        out
    }

    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Total bytes of every table file
    pub fn disk_usage(&self) -> u64 {
        self.sstables.read().iter().map(|(_, r)| r.file_size()).sum()
    }

    /// Memory held by table indexes
    pub fn index_memory(&self) -> usize {
        self.sstables.read().iter().map(|(_, r)| r.index_memory()).sum()
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // File Naming
    // =========================================================================

    /// "sstable_000042.sst" inside `dir`
    pub fn sstable_path(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// "sstable_000042.sst" → Some(42)
    pub fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()?.to_str()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("sstable_")?.parse().ok()
    }
}
