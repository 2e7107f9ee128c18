//! WAL Recovery
//!
//! Replays the WAL after a crash or an unclean shutdown.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{AtlasError, Result};

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// Reads every valid entry in order. Replay stops at the first torn or
    /// corrupted record; the file is cut back to the valid prefix.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_offset) = Self::scan(path, true)?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_offset)?;
            file.sync_all()?;
            tracing::warn!(
                path = %path.display(),
                valid_bytes = valid_offset,
                corrupted = result.entries_corrupted,
                "WAL tail discarded during recovery"
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::scan(path, false)?;
        Ok(result)
    }

    fn scan(path: &Path, keep: bool) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    if keep {
                        entries.push(entry);
                    }
                }
                Ok(None) => {
                    result.was_truncated = reader.hit_partial_tail();
                    break;
                }
                Err(AtlasError::WalCorruption(reason)) => {
                    tracing::debug!(path = %path.display(), %reason, "corrupted WAL record");
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok((entries, result, reader.valid_offset()))
    }
}
