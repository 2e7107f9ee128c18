//! SSTable Iterator
//!
//! Sequential pass over every entry of an SSTable, tombstones included.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{AtlasError, Result};

use super::{entry_lengths, HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Start of the index block
    end_offset: u64,
    current_offset: u64,
    failed: bool,
}

impl SSTableIterator {
    pub(super) fn open(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
            failed: false,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        let mut prefix = [0u8; 8];
        self.file.read_exact(&mut prefix)?;
        let (key_len, val_len) = entry_lengths(&prefix);

        let value_len = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as u64 };
        let entry_size = 8 + key_len as u64 + value_len;
        if self.current_offset + entry_size > self.end_offset {
            return Err(AtlasError::Storage(format!(
                "entry at offset {} runs past the data block",
                self.current_offset
            )));
        }

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let value = if val_len == TOMBSTONE_MARKER {
            None
        } else {
            let mut v = vec![0u8; val_len as usize];
            self.file.read_exact(&mut v)?;
            Some(v)
        };

        self.current_offset += entry_size;
        Ok((key, value))
    }
}

impl Iterator for SSTableIterator {
    /// `(key, None)` is a tombstone
    type Item = Result<(Vec<u8>, Option<Vec<u8>>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }
        let entry = self.read_entry();
        self.failed = entry.is_err();
        Some(entry)
    }
}
