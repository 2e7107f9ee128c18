//! SSTable Reader
//!
//! Opens SSTable files and serves point lookups and range probes through
//! an in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{AtlasError, Result};
use crate::storage::range_is_empty;

use super::iterator::SSTableIterator;
use super::{entry_lengths, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Outcome of a point lookup in one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Vec<u8>),
    /// The table holds a tombstone for the key
    Deleted,
    /// The table knows nothing about the key
    Absent,
}

/// Reader for SSTable files
///
/// The file handle sits behind a mutex so lookups only need `&self`; the
/// reader can then be shared by many iterators through an `Arc`.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// key → file offset of its data entry
    index: BTreeMap<Vec<u8>, u64>,
    entry_count: u64,
    index_offset: u64,
    data_crc: u32,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Loads the entire index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let corrupt = |what: String| AtlasError::Storage(format!("{}: {}", path.display(), what));

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(format!("file too short ({} bytes)", file_size)));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(corrupt(format!("invalid SSTable magic {:?}", &header[0..4])));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(corrupt(format!("unsupported SSTable version {}", version)));
        }
        let entry_count = u64_at(&header, 6);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let index_offset = u64_at(&footer, 0);
        let data_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corrupt(format!("index offset {} out of bounds", index_offset)));
        }

        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < index_data.len() {
            if pos + 12 > index_data.len() {
                return Err(corrupt("truncated index entry".to_string()));
            }
            let key_len =
                u32::from_le_bytes([index_data[pos], index_data[pos + 1], index_data[pos + 2], index_data[pos + 3]])
                    as usize;
            let offset = u64_at(&index_data, pos + 4);
            pos += 12;
            if pos + key_len > index_data.len() || offset >= index_offset {
                return Err(corrupt("malformed index entry".to_string()));
            }
            index.insert(index_data[pos..pos + key_len].to_vec(), offset);
            pos += key_len;
        }

        if index.len() as u64 != entry_count {
            return Err(corrupt(format!(
                "index holds {} keys, header claims {}",
                index.len(),
                entry_count
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            data_crc,
            file_size,
        })
    }

    /// Point lookup
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        match self.index.get(key) {
            Some(&offset) => Ok(match self.read_at(offset)?.1 {
                Some(value) => Lookup::Found(value),
                None => Lookup::Deleted,
            }),
            None => Ok(Lookup::Absent),
        }
    }

    /// First entry inside `(lo, hi)` in scan order
    ///
    /// Ascending order returns the smallest key in range, descending the
    /// largest. A `None` value is a tombstone.
    pub fn first_in_range(
        &self,
        lo: Bound<&[u8]>,
        hi: Bound<&[u8]>,
        reverse: bool,
    ) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        if range_is_empty(lo, hi) {
            return Ok(None);
        }
        let mut range = self.index.range::<[u8], _>((lo, hi));
        let hit = if reverse { range.next_back() } else { range.next() };
        match hit {
            Some((_, &offset)) => self.read_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read the data entry stored at `offset`
    fn read_at(&self, offset: u64) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut prefix = [0u8; 8];
        file.read_exact(&mut prefix)?;
        let (key_len, val_len) = entry_lengths(&prefix);

        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;

        if val_len == TOMBSTONE_MARKER {
            return Ok((key, None));
        }
        let mut value = vec![0u8; val_len as usize];
        file.read_exact(&mut value)?;
        Ok((key, Some(value)))
    }

    /// Byte offset where `key` is or would be stored
    pub fn approximate_offset(&self, key: &[u8]) -> u64 {
        self.index
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(_, &offset)| offset)
            .unwrap_or(self.index_offset)
    }

    /// Recompute the data block checksum and compare it with the footer
    pub fn verify(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(HEADER_SIZE))?;

        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = self.index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(chunk.len() as u64) as usize;
            file.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }

        let actual = hasher.finalize();
        if actual != self.data_crc {
            return Err(AtlasError::Storage(format!(
                "{}: data checksum mismatch (stored {:#010x}, computed {:#010x})",
                self.path.display(),
                self.data_crc,
                actual
            )));
        }
        Ok(())
    }

    /// Sequential iterator over every entry, on its own file handle
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// False only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes held by the in-memory index
    pub fn index_memory(&self) -> usize {
        self.index.keys().map(|k| k.len() + 8).sum()
    }
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
