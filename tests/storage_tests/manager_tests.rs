//! Tests for StorageManager
//!
//! These tests verify:
//! - Table discovery and id allocation
//! - Flushing MemTables into new tables
//! - Newest-first lookups with tombstone shadowing
//! - The read cache and size estimates

use std::fs;

use atlasdown::memtable::MemTable;
use atlasdown::storage::StorageManager;
use atlasdown::AtlasError;
use tempfile::TempDir;

const CACHE: usize = 1 << 20;

fn memtable_with(pairs: &[(&str, Option<&str>)]) -> MemTable {
    let memtable = MemTable::new();
    for (key, value) in pairs {
        match value {
            Some(v) => memtable.put(key.as_bytes().to_vec(), v.as_bytes().to_vec()),
            None => memtable.delete(key.as_bytes().to_vec()),
        }
    }
    memtable
}

// =============================================================================
// Opening
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("nested").join("sstables");

    let storage = StorageManager::open(&dir, CACHE).unwrap();
    assert!(dir.is_dir());
    assert_eq!(storage.sstable_count(), 0);
    assert_eq!(storage.next_sstable_id(), 1);
}

#[test]
fn test_open_ignores_foreign_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("notes.txt"), b"hello").unwrap();
    fs::write(temp.path().join("sstable_000009.sst.tmp"), b"half").unwrap();

    let storage = StorageManager::open(temp.path(), CACHE).unwrap();
    assert_eq!(storage.sstable_count(), 0);
}

#[test]
fn test_parse_sstable_id() {
    let dir = std::path::Path::new("/data");
    let path = StorageManager::sstable_path(dir, 42);
    assert!(path.ends_with("sstable_000042.sst"));
    assert_eq!(StorageManager::parse_sstable_id(&path), Some(42));
    assert_eq!(
        StorageManager::parse_sstable_id(std::path::Path::new("/data/sstable_000042.sst.tmp")),
        None
    );
    assert_eq!(StorageManager::parse_sstable_id(std::path::Path::new("/data/other.sst")), None);
}

// =============================================================================
// Flushing
// =============================================================================

#[test]
fn test_flush_empty_memtable_fails() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path(), CACHE).unwrap();

    let result = storage.flush(&MemTable::new());
    assert!(matches!(result, Err(AtlasError::Storage(_))));
    assert_eq!(storage.sstable_count(), 0);
}

#[test]
fn test_flush_assigns_increasing_ids() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path(), CACHE).unwrap();

    let first = storage.flush(&memtable_with(&[("a", Some("1"))])).unwrap();
    let second = storage.flush(&memtable_with(&[("b", Some("2"))])).unwrap();

    assert!(first.path.ends_with("sstable_000001.sst"));
    assert!(second.path.ends_with("sstable_000002.sst"));
    assert_eq!(storage.sstable_count(), 2);
    // newest first
    assert_eq!(storage.readers()[0].path(), second.path.as_path());
}

// =============================================================================
// Lookups
// =============================================================================

#[test]
fn test_newer_table_shadows_older() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path(), CACHE).unwrap();

    storage
        .flush(&memtable_with(&[("a", Some("old")), ("b", Some("keep")), ("c", Some("x"))]))
        .unwrap();
    storage.flush(&memtable_with(&[("a", Some("new")), ("c", None)])).unwrap();

    assert_eq!(storage.get(b"a", true).unwrap(), Some(b"new".to_vec()));
    assert_eq!(storage.get(b"b", true).unwrap(), Some(b"keep".to_vec()));
    assert_eq!(storage.get(b"c", true).unwrap(), None);
    assert_eq!(storage.get(b"zzz", true).unwrap(), None);
}

#[test]
fn test_fill_cache_controls_population() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path(), CACHE).unwrap();
    storage.flush(&memtable_with(&[("k", Some("value"))])).unwrap();

    storage.get(b"k", false).unwrap();
    assert_eq!(storage.cache().usage(), 0);

    storage.get(b"k", true).unwrap();
    assert_eq!(storage.cache().usage(), "k".len() + "value".len());

    let (hits_before, _) = storage.cache().stats();
    assert_eq!(storage.get(b"k", true).unwrap(), Some(b"value".to_vec()));
    assert_eq!(storage.cache().stats().0, hits_before + 1);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_reopen_finds_tables_and_continues_ids() {
    let temp = TempDir::new().unwrap();
    {
        let storage = StorageManager::open(temp.path(), CACHE).unwrap();
        storage.flush(&memtable_with(&[("a", Some("1"))])).unwrap();
        storage.flush(&memtable_with(&[("a", Some("2"))])).unwrap();
    }

    let storage = StorageManager::open(temp.path(), CACHE).unwrap();
    assert_eq!(storage.sstable_count(), 2);
    assert_eq!(storage.next_sstable_id(), 3);
    assert_eq!(storage.get(b"a", true).unwrap(), Some(b"2".to_vec()));
}

// =============================================================================
// Introspection
// =============================================================================

#[test]
fn test_approximate_size() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path(), CACHE).unwrap();

    let memtable = MemTable::new();
    for i in 0..200 {
        memtable.put(format!("key{:04}", i).into_bytes(), vec![b'v'; 100]);
    }
    storage.flush(&memtable).unwrap();

    let whole = storage.approximate_size(b"key0000", b"key9999");
    let half = storage.approximate_size(b"key0000", b"key0100");
    assert!(whole >= 200 * 100);
    assert!(half > 0 && half < whole);
    assert_eq!(storage.approximate_size(b"key0100", b"key0000"), 0);
    assert_eq!(storage.approximate_size(b"a", b"b"), 0);
}

#[test]
fn test_describe_and_usage() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path(), CACHE).unwrap();
    let table = storage.flush(&memtable_with(&[("alpha", Some("1")), ("omega", Some("2"))])).unwrap();

    let report = storage.describe();
    assert!(report.contains("sstable_000001.sst"));
    assert!(report.contains("entries=2"));
    assert!(report.contains("alpha"));
    assert_eq!(storage.disk_usage(), table.file_size);
    assert!(storage.index_memory() > 0);
}
