//! Maintenance operations
//!
//! `destroy` and `repair` work on a location directly, without an open
//! handle. Each has a blocking form and a callback form.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::engine::WAL_FILENAME;
use crate::error::{AtlasError, Result};
use crate::executor;
use crate::storage::{SSTableBuilder, SSTableReader, StorageManager, SSTABLE_DIR};
use crate::wal::{Operation, WalReader};

/// Directory (inside the location) that receives unreadable tables
pub const LOST_DIR: &str = "lost";

/// What a repair did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairReport {
    /// Readable tables folded into the new table
    pub tables_merged: usize,
    /// Unreadable tables moved to `lost/`
    pub tables_lost: usize,
    /// WAL records replayed on top of the tables
    pub wal_records_recovered: usize,
    /// Live entries in the rebuilt table
    pub entries_written: u64,
}

fn validate_location(location: &Path) -> Result<()> {
    if location.as_os_str().is_empty() {
        return Err(AtlasError::invalid("location cannot be empty"));
    }
    Ok(())
}

// =============================================================================
// Destroy
// =============================================================================

/// Remove every store file at `location`
///
/// Files the store did not create are left alone; directories are removed
/// only once empty. A missing location is not an error.
pub fn destroy(location: impl AsRef<Path>) -> Result<()> {
    let location = location.as_ref();
    validate_location(location)?;
    if !location.exists() {
        return Ok(());
    }

    let mut removed = 0usize;
    let wal = location.join(WAL_FILENAME);
    if wal.is_file() {
        fs::remove_file(&wal)?;
        removed += 1;
    }
    for dir in [location.join(SSTABLE_DIR), location.join(LOST_DIR)] {
        if dir.is_dir() {
            removed += remove_table_files(&dir)?;
            remove_dir_if_empty(&dir)?;
        }
    }
    remove_dir_if_empty(location)?;

    tracing::info!(location = %location.display(), files = removed, "store destroyed");
    Ok(())
}

pub fn destroy_async<F>(location: impl AsRef<Path>, callback: F) -> Result<()>
where
    F: FnOnce(Result<()>) + Send + 'static,
{
    let location = location.as_ref().to_path_buf();
    validate_location(&location)?;
    executor::global().submit(move || destroy(&location), callback);
    Ok(())
}

fn is_table_artifact(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    StorageManager::parse_sstable_id(path).is_some()
        || (name.starts_with("sstable_") && name.ends_with(".tmp"))
}

fn remove_table_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_table_artifact(&path) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn remove_dir_if_empty(dir: &Path) -> Result<()> {
    if fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
    }
    Ok(())
}

// =============================================================================
// Repair
// =============================================================================

type Merged = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Rebuild a consistent store at `location`
///
/// Readable tables are merged oldest to newest, recoverable WAL records
/// are replayed on top, and the live result is written as one new table.
/// The old tables and the WAL are then removed. Tables that fail to open
/// or verify are moved to `lost/`.
pub fn repair(location: impl AsRef<Path>) -> Result<RepairReport> {
    let location = location.as_ref();
    validate_location(location)?;

    let meta = fs::metadata(location)?;
    if !meta.is_dir() {
        return Err(AtlasError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("{} is not a directory", location.display()),
        )));
    }

    let table_dir = location.join(SSTABLE_DIR);
    let wal_path = location.join(WAL_FILENAME);
    let mut report = RepairReport::default();
    if !table_dir.is_dir() && !wal_path.is_file() {
        tracing::info!(location = %location.display(), "no store to repair");
        return Ok(report);
    }
    fs::create_dir_all(&table_dir)?;
    let mut merged = Merged::new();

    let mut ids = StorageManager::discover(&table_dir)?;
    ids.sort_unstable();
    let mut consumed: Vec<PathBuf> = Vec::new();

    for &id in &ids {
        let path = StorageManager::sstable_path(&table_dir, id);
        match read_table(&path) {
            Ok(entries) => {
                merged.extend(entries);
                consumed.push(path);
                report.tables_merged += 1;
            }
            Err(e) => {
                tracing::warn!(table = %path.display(), error = %e, "moving unreadable table aside");
                move_to_lost(location, &path)?;
                report.tables_lost += 1;
            }
        }
    }

    if wal_path.is_file() {
        report.wal_records_recovered = replay_wal(&wal_path, &mut merged)?;
    }

    let next_id = ids.last().map_or(1, |id| id + 1);
    let live: Vec<_> = merged
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect();
    if !live.is_empty() {
        let mut builder = SSTableBuilder::new(&StorageManager::sstable_path(&table_dir, next_id))?;
        for (key, value) in &live {
            builder.add(key, value)?;
        }
        report.entries_written = builder.finish()?.entry_count;
    }

    for path in consumed {
        fs::remove_file(path)?;
    }
    remove_table_leftovers(&table_dir)?;
    if wal_path.is_file() {
        fs::remove_file(&wal_path)?;
    }

    tracing::info!(
        location = %location.display(),
        merged = report.tables_merged,
        lost = report.tables_lost,
        wal_records = report.wal_records_recovered,
        entries = report.entries_written,
        "store repaired"
    );
    Ok(report)
}

pub fn repair_async<F>(location: impl AsRef<Path>, callback: F) -> Result<()>
where
    F: FnOnce(Result<RepairReport>) + Send + 'static,
{
    let location = location.as_ref().to_path_buf();
    validate_location(&location)?;
    executor::global().submit(move || repair(&location), callback);
    Ok(())
}

/// Every entry of a table that opens and passes its checksum
fn read_table(path: &Path) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>> {
    let reader = SSTableReader::open(path)?;
    reader.verify()?;
    reader.iter()?.collect()
}

fn move_to_lost(location: &Path, table: &Path) -> Result<()> {
    let lost = location.join(LOST_DIR);
    fs::create_dir_all(&lost)?;
    if let Some(name) = table.file_name() {
        fs::rename(table, lost.join(name))?;
    }
    Ok(())
}

/// Apply every readable WAL record; stops quietly at the first bad one
fn replay_wal(path: &Path, merged: &mut Merged) -> Result<usize> {
    let mut records = 0;
    for entry in WalReader::open(path)?.entries() {
        match entry {
            Ok(entry) => {
                apply(merged, entry.operation);
                records += 1;
            }
            Err(e) => {
                tracing::warn!(wal = %path.display(), error = %e, "WAL replay stopped early");
                break;
            }
        }
    }
    Ok(records)
}

fn apply(merged: &mut Merged, operation: Operation) {
    match operation {
        Operation::Put { key, value } => {
            merged.insert(key, Some(value));
        }
        Operation::Delete { key } => {
            merged.insert(key, None);
        }
        Operation::Batch { ops } => ops.into_iter().for_each(|op| apply(merged, op)),
    }
}

fn remove_table_leftovers(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tmp = path.extension().and_then(|e| e.to_str()) == Some("tmp");
        if path.is_file() && is_tmp && is_table_artifact(&path) {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
