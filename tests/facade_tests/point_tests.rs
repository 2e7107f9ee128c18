//! get / put / del / is_exists / multi_get / get_buffer

use atlasdown::{
    AtlasError, ErrorKind, GetBufferOptions, GetOptions, MultiGetOptions, ReadOptions, Value,
    WriteOptions,
};
use bytes::BytesMut;

use super::{open_temp_db, reply, TIMEOUT};

// =============================================================================
// get / put / del
// =============================================================================

#[test]
fn test_put_get_text_and_buffer() {
    let (_temp, db) = open_temp_db();
    db.put("greeting", "hello", WriteOptions::default()).unwrap();

    let text = db.get("greeting", GetOptions::default()).unwrap();
    assert_eq!(text, Value::Text("hello".to_string()));

    let raw = db
        .get("greeting", GetOptions { as_buffer: true, ..GetOptions::default() })
        .unwrap();
    assert!(raw.is_buffer());
    assert_eq!(raw.as_bytes(), b"hello");
}

#[test]
fn test_text_mode_is_lossy() {
    let (_temp, db) = open_temp_db();
    db.put(b"bin", [0x66, 0xFF, 0x6F], WriteOptions::default()).unwrap();

    let value = db.get(b"bin", GetOptions::default()).unwrap();
    assert_eq!(value.as_str(), Some("f\u{FFFD}o"));
}

#[test]
fn test_get_missing_is_not_found() {
    let (_temp, db) = open_temp_db();
    let err = db.get("nothing", GetOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().starts_with("NotFound"));
}

#[test]
fn test_empty_key_rejected_everywhere() {
    let (_temp, db) = open_temp_db();
    let invalid = |r: atlasdown::Result<()>| assert_eq!(r.unwrap_err().kind(), ErrorKind::InvalidArgument);

    invalid(db.put("", "v", WriteOptions::default()));
    invalid(db.del("", WriteOptions::default()));
    invalid(db.get("", GetOptions::default()).map(|_| ()));
    invalid(db.is_exists("", ReadOptions::default()).map(|_| ()));
    invalid(db.get_async("", GetOptions::default(), |_| {}));
    invalid(db.multi_get(&["ok", ""], MultiGetOptions::default()).map(|_| ()));
}

#[test]
fn test_empty_value_is_allowed() {
    let (_temp, db) = open_temp_db();
    db.put("k", "", WriteOptions::default()).unwrap();
    assert!(db.get("k", GetOptions::default()).unwrap().is_empty());
    assert!(db.is_exists("k", ReadOptions::default()).unwrap());
}

#[test]
fn test_async_put_get_del() {
    let (_temp, db) = open_temp_db();

    let (tx, rx) = reply();
    db.put_async("k", "v", WriteOptions { sync: true }, move |r| tx.send(r).unwrap())
        .unwrap();
    rx.recv_timeout(TIMEOUT).unwrap().unwrap();

    let (tx, rx) = reply();
    db.get_async("k", GetOptions { as_buffer: true, ..GetOptions::default() }, move |r| {
        tx.send(r).unwrap()
    })
    .unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().unwrap().as_bytes(), b"v");

    let (tx, rx) = reply();
    db.del_async("k", WriteOptions::default(), move |r| tx.send(r).unwrap())
        .unwrap();
    rx.recv_timeout(TIMEOUT).unwrap().unwrap();

    let (tx, rx) = reply();
    db.get_async("k", GetOptions::default(), move |r| tx.send(r).unwrap())
        .unwrap();
    assert!(rx.recv_timeout(TIMEOUT).unwrap().unwrap_err().is_not_found());
}

#[test]
fn test_is_exists_both_forms() {
    let (_temp, db) = open_temp_db();
    db.put("here", "1", WriteOptions::default()).unwrap();

    assert!(db.is_exists("here", ReadOptions::default()).unwrap());
    assert!(!db.is_exists("gone", ReadOptions::default()).unwrap());

    let (tx, rx) = reply();
    db.is_exists_async("here", ReadOptions::default(), move |r| tx.send(r).unwrap())
        .unwrap();
    assert!(rx.recv_timeout(TIMEOUT).unwrap().unwrap());
}

// =============================================================================
// multi_get
// =============================================================================

#[test]
fn test_multi_get_interleaves_keys() {
    let (_temp, db) = open_temp_db();
    db.put("a", "1", WriteOptions::default()).unwrap();
    db.put("b", "2", WriteOptions::default()).unwrap();

    let out = db.multi_get(&["a", "b"], MultiGetOptions::default()).unwrap();
    assert_eq!(
        out,
        vec![
            Some(Value::from(b"a".as_slice())),
            Some(Value::Text("1".into())),
            Some(Value::from(b"b".as_slice())),
            Some(Value::Text("2".into())),
        ]
    );
}

#[test]
fn test_multi_get_missing_key() {
    let (_temp, db) = open_temp_db();
    db.put("a", "1", WriteOptions::default()).unwrap();
    db.put("c", "3", WriteOptions::default()).unwrap();

    let err = db.multi_get(&["a", "b", "c"], MultiGetOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let lenient = MultiGetOptions { raise_error: false, ..MultiGetOptions::default() };
    let out = db.multi_get(&["a", "b", "c"], lenient).unwrap();
    assert_eq!(out.len(), 6);
    assert_eq!(out[3], None);

    let values_only = MultiGetOptions { keys: false, as_buffer: true, ..lenient };
    let out = db.multi_get(&["a", "b", "c"], values_only).unwrap();
    assert_eq!(out.len(), 3);
    assert_eq!(out[2].as_ref().map(|v| v.as_bytes().to_vec()), Some(b"3".to_vec()));
}

#[test]
fn test_multi_get_async() {
    let (_temp, db) = open_temp_db();
    db.put("x", "9", WriteOptions::default()).unwrap();

    let (tx, rx) = reply();
    db.multi_get_async(&["x"], MultiGetOptions { keys: false, ..MultiGetOptions::default() }, move |r| {
        tx.send(r).unwrap()
    })
    .unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().unwrap(), vec![Some(Value::Text("9".into()))]);
}

// =============================================================================
// get_buffer
// =============================================================================

#[test]
fn test_get_buffer_at_offset() {
    let (_temp, db) = open_temp_db();
    db.put("k", "abc", WriteOptions::default()).unwrap();

    let mut dest = [b'.'; 6];
    let written = db
        .get_buffer("k", &mut dest, GetBufferOptions { offset: 2, ..GetBufferOptions::default() })
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(&dest, b"..abc.");
}

#[test]
fn test_get_buffer_errors() {
    let (_temp, db) = open_temp_db();
    db.put("k", "abcdef", WriteOptions::default()).unwrap();
    let mut dest = [0u8; 4];

    let err = db.get_buffer("k", &mut dest, GetBufferOptions::default()).unwrap_err();
    assert!(matches!(err, AtlasError::BufferTooSmall { needed: 6, available: 4 }));

    let past_end = GetBufferOptions { offset: 5, ..GetBufferOptions::default() };
    assert_eq!(
        db.get_buffer("k", &mut dest, past_end).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert!(db
        .get_buffer("none", &mut dest, GetBufferOptions::default())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_get_buffer_async_returns_buffer() {
    let (_temp, db) = open_temp_db();
    db.put("k", "payload", WriteOptions::default()).unwrap();

    let (tx, rx) = reply();
    let dest = BytesMut::zeroed(16);
    db.get_buffer_async("k", dest, GetBufferOptions::default(), move |r, buf| {
        tx.send((r, buf)).unwrap()
    })
    .unwrap();

    let (written, buf) = rx.recv_timeout(TIMEOUT).unwrap();
    let written = written.unwrap();
    assert_eq!(&buf[..written], b"payload");
    assert_eq!(buf.len(), 16);
}

// =============================================================================
// Introspection
// =============================================================================

#[test]
fn test_approximate_size_and_property() {
    let (_temp, db) = open_temp_db();
    for i in 0..50 {
        db.put(format!("key{:02}", i), vec![b'v'; 128], WriteOptions::default()).unwrap();
    }
    db.close().unwrap();
    db.open(atlasdown::Config::default()).unwrap();

    assert!(db.approximate_size("key00", "key49").unwrap() > 0);

    let (tx, rx) = reply();
    db.approximate_size_async("key49", "key00", move |r| tx.send(r).unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().unwrap(), 0);

    assert_eq!(db.get_property("atlaskv.num-files").unwrap(), "1");
    assert_eq!(db.get_property("no.such.property").unwrap(), "");
}
