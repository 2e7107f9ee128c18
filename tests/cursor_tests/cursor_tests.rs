//! Tests for Cursor
//!
//! These tests verify:
//! - Range selection (start/end, gt/gte/lt/lte, reverse, limit)
//! - Paging against the high water mark
//! - State transitions and end semantics
//! - The callback form and its one-in-flight rule
//! - Seek

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atlasdown::{
    Config, Cursor, CursorState, Database, ErrorKind, IteratorOptions, Value, WriteOptions,
};
use crossbeam::channel::bounded;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Helper Functions
// =============================================================================

/// Store holding "k00".."k{n-1}" → "v00".."v{n-1}"
fn setup_db(n: usize) -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path()).unwrap();
    db.open(Config::default()).unwrap();
    for i in 0..n {
        db.put(format!("k{:02}", i), format!("v{:02}", i), WriteOptions::default())
            .unwrap();
    }
    (temp_dir, db)
}

fn collect_keys(cursor: &Cursor) -> Vec<String> {
    let mut keys = Vec::new();
    while let Some((key, _)) = cursor.next().unwrap() {
        keys.push(key.as_str().unwrap().to_string());
    }
    keys
}

fn scan(db: &Database, options: IteratorOptions) -> Vec<String> {
    let cursor = db.iterator(options).unwrap();
    let keys = collect_keys(&cursor);
    cursor.end().unwrap();
    keys
}

fn key(k: &str) -> Option<Vec<u8>> {
    Some(k.as_bytes().to_vec())
}

// =============================================================================
// Range Selection
// =============================================================================

#[test]
fn test_full_scan_forward_and_reverse() {
    let (_temp, db) = setup_db(10);

    let forward = scan(&db, IteratorOptions::default());
    assert_eq!(forward.len(), 10);
    assert_eq!(forward.first().map(String::as_str), Some("k00"));

    let mut reverse = scan(&db, IteratorOptions { reverse: true, ..IteratorOptions::default() });
    reverse.reverse();
    assert_eq!(reverse, forward);
}

#[test]
fn test_start_end_are_inclusive() {
    let (_temp, db) = setup_db(10);
    let keys = scan(
        &db,
        IteratorOptions { start: key("k03"), end: key("k05"), ..IteratorOptions::default() },
    );
    assert_eq!(keys, vec!["k03", "k04", "k05"]);
}

#[test]
fn test_reverse_start_is_the_upper_end() {
    let (_temp, db) = setup_db(10);
    let keys = scan(
        &db,
        IteratorOptions {
            start: key("k05"),
            end: key("k03"),
            reverse: true,
            ..IteratorOptions::default()
        },
    );
    assert_eq!(keys, vec!["k05", "k04", "k03"]);
}

#[test]
fn test_exclusive_bounds_override_start_end() {
    let (_temp, db) = setup_db(10);
    let keys = scan(
        &db,
        IteratorOptions {
            start: key("k00"),
            gt: key("k02"),
            lt: key("k06"),
            ..IteratorOptions::default()
        },
    );
    assert_eq!(keys, vec!["k03", "k04", "k05"]);
}

#[test]
fn test_bounds_between_keys_and_empty_ranges() {
    let (_temp, db) = setup_db(5);
    let keys = scan(
        &db,
        IteratorOptions { gte: key("k01a"), lte: key("k03a"), ..IteratorOptions::default() },
    );
    assert_eq!(keys, vec!["k02", "k03"]);

    let inverted = scan(
        &db,
        IteratorOptions { gte: key("k04"), lte: key("k01"), ..IteratorOptions::default() },
    );
    assert!(inverted.is_empty());
}

#[test]
fn test_empty_bound_keys_are_ignored() {
    let (_temp, db) = setup_db(3);
    let keys = scan(
        &db,
        IteratorOptions { start: key(""), lt: key(""), ..IteratorOptions::default() },
    );
    assert_eq!(keys.len(), 3);
}

#[test]
fn test_limit() {
    let (_temp, db) = setup_db(10);
    let keys = scan(&db, IteratorOptions { limit: Some(4), ..IteratorOptions::default() });
    assert_eq!(keys, vec!["k00", "k01", "k02", "k03"]);

    let keys = scan(
        &db,
        IteratorOptions { limit: Some(2), reverse: true, ..IteratorOptions::default() },
    );
    assert_eq!(keys, vec!["k09", "k08"]);

    assert!(scan(&db, IteratorOptions { limit: Some(0), ..IteratorOptions::default() }).is_empty());
}

// =============================================================================
// Entry Shape
// =============================================================================

#[test]
fn test_default_entries_are_buffers() {
    let (_temp, db) = setup_db(1);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();
    let (k, v) = cursor.next().unwrap().unwrap();
    assert!(k.is_buffer());
    assert_eq!(v.as_bytes(), b"v00");
}

#[test]
fn test_text_entries_and_omitted_parts() {
    let (_temp, db) = setup_db(2);
    let cursor = db
        .iterator(IteratorOptions {
            key_as_buffer: false,
            values: false,
            ..IteratorOptions::default()
        })
        .unwrap();

    let (k, v) = cursor.next().unwrap().unwrap();
    assert_eq!(k, Value::Text("k00".into()));
    assert!(v.is_empty());
}

#[test]
fn test_deleted_keys_are_skipped() {
    let (_temp, db) = setup_db(6);
    db.del("k01", WriteOptions::default()).unwrap();
    db.del("k04", WriteOptions::default()).unwrap();
    assert_eq!(scan(&db, IteratorOptions::default()), vec!["k00", "k02", "k03", "k05"]);
}

// =============================================================================
// Paging
// =============================================================================

#[test]
fn test_small_high_water_mark_still_yields_everything() {
    let (_temp, db) = setup_db(25);
    let keys = scan(&db, IteratorOptions { high_water_mark: 0, ..IteratorOptions::default() });
    assert_eq!(keys.len(), 25);
}

#[test]
fn test_iteration_spans_memtable_and_tables() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path()).unwrap();
    db.open(Config::builder().write_buffer_size(256).build()).unwrap();
    for i in 0..200 {
        db.put(format!("key{:03}", i), "0123456789", WriteOptions::default()).unwrap();
    }

    let keys = scan(&db, IteratorOptions { high_water_mark: 100, ..IteratorOptions::default() });
    assert_eq!(keys.len(), 200);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_cursor_sees_snapshot() {
    let (_temp, db) = setup_db(3);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();
    db.put("k99", "late", WriteOptions::default()).unwrap();
    db.del("k00", WriteOptions::default()).unwrap();

    assert_eq!(collect_keys(&cursor), vec!["k00", "k01", "k02"]);
}

// =============================================================================
// States and End
// =============================================================================

#[test]
fn test_state_transitions() {
    let (_temp, db) = setup_db(1);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();
    assert_eq!(cursor.state(), CursorState::Created);

    assert!(cursor.next().unwrap().is_some());
    assert_eq!(cursor.state(), CursorState::Active);

    assert!(cursor.next().unwrap().is_none());
    assert_eq!(cursor.state(), CursorState::Exhausted);
    // exhaustion is sticky
    assert!(cursor.next().unwrap().is_none());

    cursor.end().unwrap();
    assert_eq!(cursor.state(), CursorState::Ended);
}

#[test]
fn test_end_twice_and_next_after_end() {
    let (_temp, db) = setup_db(3);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();
    cursor.next().unwrap();

    cursor.end().unwrap();
    assert_eq!(cursor.end().unwrap_err().kind(), ErrorKind::IteratorClosed);
    assert_eq!(cursor.next().unwrap_err().kind(), ErrorKind::IteratorClosed);
    assert_eq!(cursor.seek("k00").unwrap_err().kind(), ErrorKind::IteratorClosed);
}

#[test]
fn test_end_async() {
    let (_temp, db) = setup_db(1);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();

    let (tx, rx) = bounded(1);
    cursor.end_async(move |r| tx.send(r).unwrap()).unwrap();
    rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    assert_eq!(cursor.end_async(|_| {}).unwrap_err().kind(), ErrorKind::IteratorClosed);
}

// =============================================================================
// Callback Form
// =============================================================================

#[test]
fn test_next_async_walks_the_range() {
    let (_temp, db) = setup_db(20);
    let cursor = db
        .iterator(IteratorOptions { high_water_mark: 16, ..IteratorOptions::default() })
        .unwrap();

    let mut seen = 0;
    loop {
        let (tx, rx) = bounded(1);
        cursor.next_async(move |r| tx.send(r).unwrap()).unwrap();
        match rx.recv_timeout(TIMEOUT).unwrap().unwrap() {
            Some((k, _)) => {
                assert_eq!(k.as_bytes(), format!("k{:02}", seen).as_bytes());
                seen += 1;
            }
            None => break,
        }
    }
    assert_eq!(seen, 20);
    assert_eq!(cursor.state(), CursorState::Exhausted);
}

#[test]
fn test_second_next_while_fetching_is_rejected() {
    let (_temp, db) = setup_db(5);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();

    // park the completion thread so the first fetch cannot finish yet
    let (gate_tx, gate_rx) = bounded::<()>(0);
    atlasdown::executor::global().complete(move || {
        let _ = gate_rx.recv_timeout(TIMEOUT);
    });

    let (tx, rx) = bounded(1);
    cursor.next_async(move |r| tx.send(r).unwrap()).unwrap();

    let err = cursor.next().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("before previous next() has completed"));

    gate_tx.send(()).unwrap();
    let (k, _) = rx.recv_timeout(TIMEOUT).unwrap().unwrap().unwrap();
    assert_eq!(k.as_bytes(), b"k00");
    assert!(cursor.next().unwrap().is_some());
}

#[test]
fn test_buffered_entry_is_still_delivered_later() {
    let (_temp, db) = setup_db(5);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();

    // the first page holds one entry, the second buffers the rest
    cursor.next().unwrap();
    assert_eq!(cursor.next().unwrap().unwrap().0.as_bytes(), b"k01");

    let (gate_tx, gate_rx) = bounded::<()>(0);
    atlasdown::executor::global().complete(move || {
        let _ = gate_rx.recv_timeout(TIMEOUT);
    });

    let ran = Arc::new(AtomicBool::new(false));
    let (tx, rx) = bounded(1);
    let flag = Arc::clone(&ran);
    cursor
        .next_async(move |r| {
            flag.store(true, Ordering::SeqCst);
            let name = thread::current().name().map(str::to_string);
            tx.send((r, name)).unwrap();
        })
        .unwrap();
    assert!(!ran.load(Ordering::SeqCst));

    gate_tx.send(()).unwrap();
    let (outcome, thread_name) = rx.recv_timeout(TIMEOUT).unwrap();
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(thread_name.as_deref(), Some("atlasdown-completion"));
    assert_eq!(outcome.unwrap().unwrap().0.as_bytes(), b"k02");
}

#[test]
fn test_end_during_fetch_reports_closed() {
    let (_temp, db) = setup_db(5);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();

    let (gate_tx, gate_rx) = bounded::<()>(0);
    atlasdown::executor::global().complete(move || {
        let _ = gate_rx.recv_timeout(TIMEOUT);
    });

    let (tx, rx) = bounded(1);
    cursor.next_async(move |r| tx.send(r).unwrap()).unwrap();
    cursor.end().unwrap();

    gate_tx.send(()).unwrap();
    let outcome = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(outcome.unwrap_err().kind(), ErrorKind::IteratorClosed);
}

// =============================================================================
// Seek
// =============================================================================

#[test]
fn test_seek_forward_and_back() {
    let (_temp, db) = setup_db(10);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();
    cursor.next().unwrap();

    cursor.seek("k05").unwrap();
    assert_eq!(cursor.next().unwrap().unwrap().0.as_bytes(), b"k05");

    cursor.seek("k01x").unwrap();
    assert_eq!(cursor.next().unwrap().unwrap().0.as_bytes(), b"k02");
}

#[test]
fn test_seek_in_reverse() {
    let (_temp, db) = setup_db(10);
    let cursor = db
        .iterator(IteratorOptions { reverse: true, ..IteratorOptions::default() })
        .unwrap();

    cursor.seek("k04x").unwrap();
    assert_eq!(collect_keys(&cursor), vec!["k04", "k03", "k02", "k01", "k00"]);
}

#[test]
fn test_seek_revives_exhausted_cursor() {
    let (_temp, db) = setup_db(3);
    let cursor = db.iterator(IteratorOptions::default()).unwrap();
    assert_eq!(collect_keys(&cursor).len(), 3);
    assert_eq!(cursor.state(), CursorState::Exhausted);

    cursor.seek("k01").unwrap();
    assert_eq!(collect_keys(&cursor), vec!["k01", "k02"]);
}

#[test]
fn test_seek_outside_range_yields_nothing() {
    let (_temp, db) = setup_db(10);
    let cursor = db
        .iterator(IteratorOptions { lte: key("k04"), ..IteratorOptions::default() })
        .unwrap();

    cursor.seek("k07").unwrap();
    assert!(cursor.next().unwrap().is_none());
}
