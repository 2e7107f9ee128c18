//! Tests for WAL Writer
//!
//! These tests verify:
//! - LSN generation and sequencing
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Truncation
//! - Resuming an existing log

use std::path::PathBuf;

use atlasdown::config::WalSyncStrategy;
use atlasdown::wal::{Operation, WalReader, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(i: usize) -> Operation {
    Operation::Put {
        key: format!("key{}", i).into_bytes(),
        value: format!("val{}", i).into_bytes(),
    }
}

fn read_all(path: &PathBuf) -> Vec<atlasdown::wal::WalEntry> {
    WalReader::open(path)
        .unwrap()
        .entries()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_lsn_sequential() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    for i in 0..50 {
        assert_eq!(writer.append(&put(i)).unwrap(), (i + 1) as u64);
    }
    assert_eq!(writer.current_lsn(), 51);
}

#[test]
fn test_write_then_read() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(&put(1)).unwrap();
    writer.append(&Operation::Delete { key: b"key1".to_vec() }).unwrap();

    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].operation, put(1));
    assert_eq!(entries[1].lsn, 2);
}

#[test]
fn test_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&put(1)).unwrap();
        writer.append(&put(2)).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 3);
    assert_eq!(writer.append(&put(3)).unwrap(), 3);
    assert_eq!(read_all(&wal_path).len(), 3);
}

#[test]
fn test_oversized_append_leaves_log_untouched() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(&put(1)).unwrap();

    let huge = Operation::Put {
        key: b"huge".to_vec(),
        value: vec![0u8; atlasdown::wal::MAX_ENTRY_SIZE + 1],
    };
    assert!(writer.append(&huge).is_err());
    assert_eq!(writer.current_lsn(), 2);
    assert_eq!(read_all(&wal_path).len(), 1);
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_write() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(&put(1)).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 5 }).unwrap();

    for i in 0..4 {
        writer.append(&put(i)).unwrap();
    }
    assert_eq!(writer.uncommitted_count(), 4);

    // 5th entry triggers sync
    writer.append(&put(5)).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(&put(6)).unwrap();
    assert_eq!(writer.uncommitted_count(), 1);
}

#[test]
fn test_forced_sync_append() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 100 }).unwrap();

    writer.append(&put(1)).unwrap();
    writer.append(&put(2)).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    assert_eq!(writer.append_with(&put(3), true).unwrap(), 3);
    assert_eq!(writer.uncommitted_count(), 0);
    assert_eq!(read_all(&wal_path).len(), 3);
}

#[test]
fn test_manual_sync() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 100 }).unwrap();

    writer.append(&put(1)).unwrap();
    writer.append(&put(2)).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_truncate_resets_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    for i in 0..10 {
        writer.append(&put(i)).unwrap();
    }
    writer.truncate().unwrap();

    assert_eq!(writer.current_lsn(), 1);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);

    assert_eq!(writer.append(&put(99)).unwrap(), 1);
    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, put(99));
}
