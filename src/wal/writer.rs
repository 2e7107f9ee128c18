//! WAL Writer
//!
//! Appends records to the WAL file and applies the configured fsync policy.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{AtlasError, Result};

use super::entry::{encode_record, now_millis};
use super::{Operation, WalReader};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN the next append will receive
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Appends since the last fsync
    uncommitted: usize,
    /// File length covered by acknowledged appends
    len: u64,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Existing records are scanned so LSNs continue where the file left off.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let last_lsn = if path.exists() {
            let mut reader = WalReader::open(path)?;
            let mut last = 0;
            while let Ok(Some(entry)) = reader.next_entry() {
                last = entry.lsn;
            }
            last
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            uncommitted: 0,
            len,
        })
    }

    /// Append an operation, returning the LSN it was logged under
    pub fn append(&mut self, operation: &Operation) -> Result<u64> {
        self.append_with(operation, false)
    }

    /// Append an operation, fsyncing afterwards when `force_sync` is set or
    /// the sync strategy says one is due
    ///
    /// On failure the file is cut back to where it was, so a record the
    /// caller saw fail never replays.
    pub fn append_with(&mut self, operation: &Operation, force_sync: bool) -> Result<u64> {
        let lsn = self.next_lsn;
        let bytes = encode_record(lsn, operation, now_millis())?;
        let start = self.len;

        let written = self
            .writer
            .write_all(&bytes)
            .and_then(|_| self.writer.flush())
            .map_err(|e| AtlasError::WalWrite(format!("{}: {}", self.path.display(), e)));
        if let Err(e) = written {
            self.rollback(start);
            return Err(e);
        }

        let due = force_sync
            || match self.sync_strategy {
                WalSyncStrategy::EveryWrite => true,
                WalSyncStrategy::EveryNEntries { count } => self.uncommitted + 1 >= count.max(1),
            };
        if due {
            if let Err(e) = self.writer.get_ref().sync_data() {
                self.rollback(start);
                return Err(e.into());
            }
            self.uncommitted = 0;
        } else {
            self.uncommitted += 1;
        }

        self.len = start + bytes.len() as u64;
        self.next_lsn += 1;
        Ok(lsn)
    }

    /// Cut the log back to `len`, dropping anything still buffered
    pub(crate) fn rollback(&mut self, len: u64) {
        let restored = self.writer.get_ref().try_clone().and_then(|file| {
            let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
            // into_parts hands back the buffer without writing it
            let _ = stale.into_parts();
            let file = self.writer.get_mut();
            file.set_len(len)?;
            file.seek(SeekFrom::Start(len))?;
            Ok(())
        });
        match restored {
            Ok(()) => self.len = len,
            Err(e) => tracing::error!(
                path = %self.path.display(),
                error = %e,
                "failed to roll back WAL after a failed append"
            ),
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// Discard every record (their contents are durable elsewhere)
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;

        self.next_lsn = 1;
        self.uncommitted = 0;
        self.len = 0;
        Ok(())
    }

    /// Get the current LSN (the one the next append will use)
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Appends not yet covered by an fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
