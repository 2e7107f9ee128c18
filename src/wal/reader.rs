//! WAL Reader
//!
//! Sequential record reader. A torn tail (short header or short payload)
//! reads as end-of-log; a checksum mismatch is an error.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{AtlasError, Result};

use super::entry::{EntryHeader, HEADER_SIZE, MAX_ENTRY_SIZE};
use super::WalEntry;

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Byte offset just past the last complete, valid record
    valid_offset: u64,
    /// Set once a torn record was found at the tail
    partial_tail: bool,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            valid_offset: 0,
            partial_tail: false,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// `Ok(None)` means end of log, including a torn final record.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                self.partial_tail = true;
                return Ok(None);
            }
            _ => {}
        }

        let header = EntryHeader::parse(&header);
        if header.len > MAX_ENTRY_SIZE {
            return Err(AtlasError::WalCorruption(format!(
                "record length {} at offset {} exceeds maximum",
                header.len, self.valid_offset
            )));
        }

        let mut payload = vec![0u8; header.len];
        if read_full(&mut self.reader, &mut payload)? < header.len {
            self.partial_tail = true;
            return Ok(None);
        }

        let entry = WalEntry::from_parts(header, &payload)?;
        self.valid_offset += (HEADER_SIZE + header.len) as u64;
        Ok(Some(entry))
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Offset of the end of the last valid record read so far
    pub fn valid_offset(&self) -> u64 {
        self.valid_offset
    }

    /// Whether a torn record was found at the tail
    pub fn hit_partial_tail(&self) -> bool {
        self.partial_tail
    }
}

/// Iterator over WAL entries; stops after the first error
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
