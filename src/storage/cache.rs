//! Read cache for SSTable point lookups
//!
//! A byte-budgeted FIFO: entries are evicted in insertion order once the
//! summed key and value lengths exceed the capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// (table id, key)
type CacheKey = (u64, Vec<u8>);

/// Cached result of a table lookup; `None` is a tombstone
pub type CachedValue = Option<Vec<u8>>;

pub struct ReadCache {
    capacity: usize,
    inner: Mutex<Inner>,
    stats: Stats,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CachedValue>,
    order: VecDeque<CacheKey>,
    usage: usize,
}

#[derive(Default)]
struct Stats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

fn charge(key: &CacheKey, value: &CachedValue) -> usize {
    key.1.len() + value.as_ref().map_or(0, Vec::len)
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
            stats: Stats::default(),
        }
    }

    pub fn get(&self, table: u64, key: &[u8]) -> Option<CachedValue> {
        let inner = self.inner.lock();
        match inner.entries.get(&(table, key.to_vec())) {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, table: u64, key: Vec<u8>, value: CachedValue) {
        let cache_key = (table, key);
        let cost = charge(&cache_key, &value);
        if cost > self.capacity {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&cache_key) {
            return;
        }
        while inner.usage + cost > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.usage -= charge(&oldest, &evicted);
            }
        }
        inner.usage += cost;
        inner.order.push_back(cache_key.clone());
        inner.entries.insert(cache_key, value);
    }

    /// Drop every entry belonging to `table`
    pub fn evict_table(&self, table: u64) {
        let mut inner = self.inner.lock();
        let Inner {
            entries,
            order,
            usage,
        } = &mut *inner;
        order.retain(|k| {
            if k.0 != table {
                return true;
            }
            if let Some(v) = entries.remove(k) {
                *usage -= charge(k, &v);
            }
            false
        });
    }

    /// Bytes currently charged against the budget
    pub fn usage(&self) -> usize {
        self.inner.lock().usage
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
        )
    }
}
