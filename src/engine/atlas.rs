//! AtlasEngine
//!
//! The bundled storage engine that coordinates WAL, MemTable and Storage.
//!
//! ## Responsibilities
//! - Enforce create/exists open semantics for a location
//! - Crash recovery on startup
//! - Serialize writes and trigger flushes when the MemTable is full
//! - Hand out consistent snapshots to iterators

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{AtlasError, Result};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{StorageManager, SSTABLE_DIR};
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::{
    AtlasIterator, BatchOp, EngineHandle, RangeOptions, SupportsBufferRead, SupportsBulkGet,
};

/// WAL file name inside a store location
pub const WAL_FILENAME: &str = "wal.log";

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/batch/flush): serialized by `write_lock`
///   - Order: write_lock → WAL → memtable → storage
///
/// - **Reads** (get): no write_lock
///   - MemTable reads take its internal read lock
///   - SSTable readers lock only their own file handle
///
/// - **Iterators**: created under `write_lock` so the MemTable snapshot and
///   the table list describe the same instant
pub struct AtlasEngine {
    config: Config,

    location: PathBuf,

    wal: Mutex<WalWriter>,

    memtable: MemTable,

    storage: StorageManager,

    write_lock: Mutex<()>,

    stats: EngineStats,
}

/// Operation counters reported by the `atlaskv.stats` property
#[derive(Debug, Default)]
pub struct EngineStats {
    pub gets: AtomicU64,
    pub puts: AtomicU64,
    pub deletes: AtomicU64,
    pub batches: AtomicU64,
    pub flushes: AtomicU64,
    pub iterators: AtomicU64,
}

impl AtlasEngine {
    /// Open the store at `location`
    ///
    /// On startup:
    /// 1. Check create/exists flags against what the location holds
    /// 2. Load existing SSTables
    /// 3. Replay the WAL, flush it to an SSTable, truncate it
    pub fn open_store(location: &Path, config: Config) -> Result<Self> {
        let wal_path = location.join(WAL_FILENAME);
        let storage_dir = location.join(SSTABLE_DIR);
        let exists = wal_path.exists() || storage_dir.exists();

        if !exists && !config.create_if_missing {
            return Err(AtlasError::Storage(format!(
                "{}: does not exist (createIfMissing is false)",
                location.display()
            )));
        }
        if exists && config.error_if_exists {
            return Err(AtlasError::Storage(format!(
                "{}: exists (errorIfExists is true)",
                location.display()
            )));
        }

        fs::create_dir_all(location)?;
        let storage = StorageManager::open(&storage_dir, config.cache_size)?;
        let memtable = MemTable::new();

        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    "WAL recovery"
                );
            }
            for entry in entries {
                memtable.apply(entry.operation);
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;

        // Recovered data goes straight to an SSTable so the log can restart
        if !memtable.is_empty() {
            tracing::debug!(entries = memtable.entry_count(), "flushing recovered entries");
            storage.flush(&memtable)?;
            memtable.clear();
            wal.truncate()?;
        }

        tracing::info!(
            location = %location.display(),
            sstables = storage.sstable_count(),
            "store opened"
        );

        Ok(Self {
            config,
            location: location.to_path_buf(),
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            stats: EngineStats::default(),
        })
    }

    /// Log then apply one operation
    fn write(&self, operation: Operation, sync: bool) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        self.wal.lock().append_with(&operation, sync)?;

        self.memtable.apply(operation);

        // The write is committed once it is logged and applied. A failed
        // flush leaves the MemTable full and is retried by the next write
        // or at close.
        if self.memtable.should_flush(self.config.write_buffer_size) {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(error = %e, "memtable flush failed; will retry");
            }
        }
        Ok(())
    }

    /// Force the MemTable to disk regardless of its size
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Called with the write lock held
    fn flush_internal(&self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        // The new table becomes visible before the MemTable empties, so a
        // concurrent get never misses a key
        self.storage.flush(&self.memtable)?;
        self.memtable.clear();
        self.wal.lock().truncate()?;
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    fn stats_report(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let (hits, misses) = self.storage.cache().stats();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "memtable: entries={} bytes={}",
            self.memtable.entry_count(),
            self.memtable.size()
        );
        let _ = writeln!(
            out,
            "sstables: count={} bytes={}",
            self.storage.sstable_count(),
            self.storage.disk_usage()
        );
        let _ = writeln!(out, "wal: next_lsn={}", self.wal.lock().current_lsn());
        let _ = writeln!(
            out,
            "ops: gets={} puts={} deletes={} batches={} iterators={} flushes={}",
            load(&self.stats.gets),
            load(&self.stats.puts),
            load(&self.stats.deletes),
            load(&self.stats.batches),
            load(&self.stats.iterators),
            load(&self.stats.flushes)
        );
        let _ = writeln!(out, "cache: hits={} misses={}", hits, misses);
        out
    }
}

impl EngineHandle for AtlasEngine {
    type Iter = AtlasIterator;

    fn open(location: &Path, config: &Config) -> Result<Self> {
        Self::open_store(location, config.clone())
    }

    /// Flush pending data and sync the WAL
    fn close(&self) -> Result<()> {
        self.flush()?;
        self.wal.lock().sync()?;
        tracing::info!(location = %self.location.display(), "store closed");
        Ok(())
    }

    /// Search order: MemTable, then SSTables newest to oldest
    fn get(&self, key: &[u8], fill_cache: bool) -> Result<Option<Vec<u8>>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        match self.memtable.get(key) {
            Some(MemTableEntry::Value(value)) => Ok(Some(value)),
            Some(MemTableEntry::Tombstone) => Ok(None),
            None => self.storage.get(key, fill_cache),
        }
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<()> {
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        self.write(
            Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            sync,
        )
    }

    fn delete(&self, key: &[u8], sync: bool) -> Result<()> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        self.write(Operation::Delete { key: key.to_vec() }, sync)
    }

    /// The whole batch is one WAL record and one MemTable update
    fn write_batch(&self, ops: Vec<BatchOp>, sync: bool) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        let ops = ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => Operation::Put { key, value },
                BatchOp::Del { key } => Operation::Delete { key },
            })
            .collect();
        self.write(Operation::Batch { ops }, sync)
    }

    fn iterator(&self, range: RangeOptions) -> Result<AtlasIterator> {
        self.stats.iterators.fetch_add(1, Ordering::Relaxed);
        let (memtable, tables) = {
            let _write_guard = self.write_lock.lock();
            (self.memtable.snapshot(), self.storage.readers())
        };
        Ok(AtlasIterator::new(memtable, tables, range))
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64> {
        Ok(self.storage.approximate_size(start, end))
    }

    fn property(&self, name: &str) -> String {
        match name {
            "atlaskv.num-files" => self.storage.sstable_count().to_string(),
            "atlaskv.sstables" => self.storage.describe(),
            "atlaskv.stats" => self.stats_report(),
            "atlaskv.approximate-memory-usage" => (self.memtable.size()
                + self.storage.index_memory()
                + self.storage.cache().usage())
            .to_string(),
            "atlaskv.cache-usage" => self.storage.cache().usage().to_string(),
            _ => String::new(),
        }
    }
}

impl SupportsBulkGet for AtlasEngine {
    fn multi_get(&self, keys: &[Vec<u8>], fill_cache: bool) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key, fill_cache)).collect()
    }
}

impl SupportsBufferRead for AtlasEngine {
    fn get_into(&self, key: &[u8], dest: &mut [u8], fill_cache: bool) -> Result<usize> {
        let value = self
            .get(key, fill_cache)?
            .ok_or_else(|| AtlasError::not_found(key))?;
        if value.len() > dest.len() {
            return Err(AtlasError::BufferTooSmall {
                needed: value.len(),
                available: dest.len(),
            });
        }
        dest[..value.len()].copy_from_slice(&value);
        Ok(value.len())
    }
}
