//! SSTable Builder
//!
//! Streams sorted entries into a new SSTable file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};

use super::{SSTable, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries
///
/// Entries are written to `<path>.tmp` and renamed into place by
/// [`finish`](SSTableBuilder::finish), so a crash never leaves a half-written
/// table under its final name.
pub struct SSTableBuilder {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    /// Offset the next entry will be written at
    current_offset: u64,
    index: Vec<(Vec<u8>, u64)>,
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Start a new table at `path`
    ///
    /// Call `add()`/`add_tombstone()` in strictly ascending key order, then
    /// `finish()`.
    pub fn new(path: &Path) -> Result<Self> {
        let tmp_path = path.with_extension("sst.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?; // entry count, patched in finish

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add a key-value pair
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None)
    }

    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if key <= last.as_slice() {
                return Err(AtlasError::Storage(format!(
                    "SSTable keys out of order: {:?} after {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                )));
            }
        }
        if let Some(v) = value {
            if v.len() >= TOMBSTONE_MARKER as usize {
                return Err(AtlasError::Storage(format!(
                    "value of {} bytes is too large for an SSTable entry",
                    v.len()
                )));
            }
        }

        self.index.push((key.to_vec(), self.current_offset));

        let key_len = (key.len() as u32).to_le_bytes();
        let val_len = value
            .map(|v| v.len() as u32)
            .unwrap_or(TOMBSTONE_MARKER)
            .to_le_bytes();

        for part in [&key_len[..], &val_len[..], key, value.unwrap_or_default()] {
            self.writer.write_all(part)?;
            self.data_hasher.update(part);
        }

        self.current_offset += 8 + key.len() as u64 + value.map_or(0, |v| v.len() as u64);
        self.entry_count += 1;
        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Write the index and footer, sync, and move the file into place
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.current_offset;

        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        let data_crc = self.data_hasher.finalize();
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| AtlasError::Storage(format!("failed to flush SSTable: {}", e)))?;
        file.seek(SeekFrom::Start(6))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;

        let mut index = self.index.into_iter();
        let min_key = index.next().map(|(k, _)| k);
        let max_key = index.next_back().map(|(k, _)| k).or_else(|| min_key.clone());

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: min_key.unwrap_or_default(),
            max_key: max_key.unwrap_or_default(),
            file_size,
        })
    }
}
