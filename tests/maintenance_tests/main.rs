//! Maintenance test suite


use std::path::Path;
use std::time::Duration;

use atlasdown::{Config, Database, WriteOptions};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Create a store at `location` holding `pairs`, then close it
pub fn populate(location: &Path, pairs: &[(&str, &str)]) {
    let db = Database::new(location).unwrap();
    db.open(Config::default()).unwrap();
    for (k, v) in pairs {
        db.put(k, v, WriteOptions::default()).unwrap();
    }
    db.close().unwrap();
}

/// Every key/value in the store at `location`, as text
pub fn dump(location: &Path) -> Vec<(String, String)> {
    let db = Database::new(location).unwrap();
    db.open(Config::default()).unwrap();
    let cursor = db.iterator(Default::default()).unwrap();
    let mut out = Vec::new();
    while let Some((k, v)) = cursor.next().unwrap() {
        out.push((k.as_str().unwrap().to_string(), v.as_str().unwrap().to_string()));
    }
    cursor.end().unwrap();
    db.close().unwrap();
    out
}
