//! AtlasIterator
//!
//! Paged merge iterator over a MemTable snapshot and a fixed set of
//! SSTables.
//!
//! Every source keeps one head entry: the first key in range past the
//! current position. A step picks the smallest head (largest in reverse);
//! when several sources hold the same key the newest wins, and every head
//! at that key is refilled. Tombstones are consumed silently.

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::memtable::{MemTableEntry, Snapshot};
use crate::storage::{range_is_empty, SSTableReader};

use super::{NativeIterator, Page, RangeOptions};

enum Source {
    Memtable(Snapshot),
    Table(Arc<SSTableReader>),
}

/// `None` value is a tombstone
type Entry = (Vec<u8>, Option<Vec<u8>>);

impl Source {
    fn first_in_range(&self, lo: Bound<&[u8]>, hi: Bound<&[u8]>, reverse: bool) -> Result<Option<Entry>> {
        match self {
            Source::Memtable(map) => {
                if range_is_empty(lo, hi) {
                    return Ok(None);
                }
                let mut range = map.range::<[u8], _>((lo, hi));
                let hit = if reverse { range.next_back() } else { range.next() };
                Ok(hit.map(|(k, v)| {
                    let value = match v {
                        MemTableEntry::Value(v) => Some(v.clone()),
                        MemTableEntry::Tombstone => None,
                    };
                    (k.clone(), value)
                }))
            }
            Source::Table(reader) => reader.first_in_range(lo, hi, reverse),
        }
    }
}

enum Head {
    /// Needs a probe before it can be compared
    Stale,
    Ready(Entry),
    Exhausted,
}

/// Iterator over one consistent view of an [`AtlasEngine`](super::AtlasEngine)
pub struct AtlasIterator {
    /// Highest priority first: MemTable, then tables newest → oldest
    sources: Vec<Source>,
    heads: Vec<Head>,
    range: RangeOptions,
    /// Entries yielded so far (counts against `limit`)
    count: usize,
    /// Last key yielded; the next probe starts strictly past it
    position: Option<Vec<u8>>,
    /// Seek target; the next probe starts at it inclusively
    seek_target: Option<Vec<u8>>,
    /// Whether the first entry since creation or seek was delivered
    landed: bool,
    finished: bool,
}

impl AtlasIterator {
    pub(crate) fn new(memtable: Snapshot, tables: Vec<Arc<SSTableReader>>, range: RangeOptions) -> Self {
        let mut sources = Vec::with_capacity(tables.len() + 1);
        sources.push(Source::Memtable(memtable));
        sources.extend(tables.into_iter().map(Source::Table));
        let heads = sources.iter().map(|_| Head::Stale).collect();

        Self {
            sources,
            heads,
            range,
            count: 0,
            position: None,
            seek_target: None,
            landed: false,
            finished: false,
        }
    }

    /// Probe range for the next step: the configured bounds narrowed by
    /// the current position or seek target
    fn probe_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let lower = as_ref(&self.range.lower);
        let upper = as_ref(&self.range.upper);
        let resume = match (&self.position, &self.seek_target) {
            (Some(pos), _) => Bound::Excluded(pos.as_slice()),
            (None, Some(target)) => Bound::Included(target.as_slice()),
            (None, None) => Bound::Unbounded,
        };
        if self.range.reverse {
            (lower, tighter_upper(upper, resume))
        } else {
            (tighter_lower(lower, resume), upper)
        }
    }

    fn refill_heads(&mut self) -> Result<()> {
        let (lo, hi) = self.probe_bounds();
        let reverse = self.range.reverse;
        let mut fresh = Vec::new();
        for (i, head) in self.heads.iter().enumerate() {
            if let Head::Stale = head {
                fresh.push((i, self.sources[i].first_in_range(lo, hi, reverse)?));
            }
        }
        for (i, entry) in fresh {
            self.heads[i] = match entry {
                Some(entry) => Head::Ready(entry),
                None => Head::Exhausted,
            };
        }
        Ok(())
    }

    /// Next live entry in range order, or `None` at the end of the range
    fn step(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            self.refill_heads()?;

            let reverse = self.range.reverse;
            let mut winner: Option<usize> = None;
            for (i, head) in self.heads.iter().enumerate() {
                let Head::Ready((key, _)) = head else { continue };
                let better = match winner.map(|w| &self.heads[w]) {
                    Some(Head::Ready((best, _))) => {
                        if reverse {
                            key > best
                        } else {
                            key < best
                        }
                    }
                    _ => true,
                };
                if better {
                    winner = Some(i);
                }
            }

            let Some(w) = winner else {
                return Ok(None);
            };
            let Head::Ready((key, value)) = std::mem::replace(&mut self.heads[w], Head::Stale) else {
                return Ok(None);
            };

            // older sources holding the same key are shadowed
            for head in self.heads.iter_mut().skip(w + 1) {
                if matches!(head, Head::Ready((k, _)) if *k == key) {
                    *head = Head::Stale;
                }
            }

            self.position = Some(key.clone());
            self.seek_target = None;

            if let Some(value) = value {
                return Ok(Some((key, value)));
            }
        }
    }

    fn limit_reached(&self) -> bool {
        matches!(self.range.limit, Some(limit) if self.count >= limit)
    }
}

impl NativeIterator for AtlasIterator {
    fn next_page(&mut self, high_water_mark: usize) -> Result<Page> {
        let mut page = Page::default();
        let mut bytes = 0usize;

        while !self.finished {
            if self.limit_reached() {
                self.finished = true;
                break;
            }
            let Some((key, value)) = self.step()? else {
                self.finished = true;
                break;
            };
            self.count += 1;
            bytes += key.len() + value.len();
            page.entries.push(if self.range.keys { key } else { Vec::new() });
            page.entries.push(if self.range.values { value } else { Vec::new() });

            if !self.landed {
                self.landed = true;
                break;
            }
            if bytes > high_water_mark {
                break;
            }
        }

        // a full page may have drained the range exactly
        if !self.finished && self.limit_reached() {
            self.finished = true;
        }
        page.finished = self.finished;
        Ok(page)
    }

    fn seek(&mut self, target: &[u8]) {
        self.position = None;
        self.seek_target = Some(target.to_vec());
        self.heads.iter_mut().for_each(|h| *h = Head::Stale);
        self.landed = false;
        self.finished = false;
    }

    fn release(&mut self) {
        self.sources.clear();
        self.heads.clear();
        self.finished = true;
    }
}

fn as_ref(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// The more restrictive of two lower bounds
fn tighter_lower<'a>(a: Bound<&'a [u8]>, b: Bound<&'a [u8]>) -> Bound<&'a [u8]> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i > e {
                Bound::Included(i)
            } else {
                Bound::Excluded(e)
            }
        }
    }
}

/// The more restrictive of two upper bounds
fn tighter_upper<'a>(a: Bound<&'a [u8]>, b: Bound<&'a [u8]>) -> Bound<&'a [u8]> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y)),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i < e {
                Bound::Included(i)
            } else {
                Bound::Excluded(e)
            }
        }
    }
}
