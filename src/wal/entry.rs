//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their on-disk
//! encoding.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a single record may carry (16 MB)
pub const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// Several puts/deletes that must be applied together or not at all
    Batch { ops: Vec<Operation> },
}

/// Decoded fixed-size record header
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: usize,
}

impl EntryHeader {
    pub(crate) fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&bytes[0..8]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&bytes[8..12]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[12..16]);

        Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len) as usize,
        }
    }
}

#[derive(Deserialize)]
struct Payload {
    operation: Operation,
    timestamp: u64,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    operation: &'a Operation,
    timestamp: u64,
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self {
            lsn,
            operation,
            timestamp: now_millis(),
        }
    }

    /// Encode as `[LSN][CRC][Len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode_record(self.lsn, &self.operation, self.timestamp)
    }

    /// Decode one complete record
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(AtlasError::WalCorruption(format!(
                "incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = EntryHeader::parse(&header);

        if header.len > MAX_ENTRY_SIZE {
            return Err(AtlasError::WalCorruption(format!(
                "record length {} exceeds maximum {}",
                header.len, MAX_ENTRY_SIZE
            )));
        }
        if bytes.len() < HEADER_SIZE + header.len {
            return Err(AtlasError::WalCorruption(format!(
                "incomplete record: expected {} payload bytes, got {}",
                header.len,
                bytes.len() - HEADER_SIZE
            )));
        }

        Self::from_parts(header, &bytes[HEADER_SIZE..HEADER_SIZE + header.len])
    }

    /// Rebuild an entry from a parsed header and its payload bytes
    pub(crate) fn from_parts(header: EntryHeader, payload: &[u8]) -> Result<Self> {
        let actual = checksum(header.lsn, payload);
        if actual != header.crc {
            return Err(AtlasError::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:#010x}, computed {:#010x}",
                header.lsn, header.crc, actual
            )));
        }

        let decoded: Payload = bincode::deserialize(payload)
            .map_err(|e| AtlasError::WalCorruption(format!("undecodable payload: {}", e)))?;

        Ok(Self {
            lsn: header.lsn,
            operation: decoded.operation,
            timestamp: decoded.timestamp,
        })
    }

    /// Size of the encoded record in bytes
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(HEADER_SIZE + self.payload_bytes()?.len())
    }

    /// CRC32 over the LSN and the payload
    pub fn compute_crc(&self) -> Result<u32> {
        Ok(checksum(self.lsn, &self.payload_bytes()?))
    }

    fn payload_bytes(&self) -> Result<Vec<u8>> {
        encode_payload(&self.operation, self.timestamp)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Encode a full record without taking ownership of the operation
pub(crate) fn encode_record(lsn: u64, operation: &Operation, timestamp: u64) -> Result<Vec<u8>> {
    let payload = encode_payload(operation, timestamp)?;
    let crc = checksum(lsn, &payload);

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&lsn.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn encode_payload(operation: &Operation, timestamp: u64) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&PayloadRef {
        operation,
        timestamp,
    })
    .map_err(|e| AtlasError::Serialization(e.to_string()))?;

    if payload.len() > MAX_ENTRY_SIZE {
        return Err(AtlasError::WalWrite(format!(
            "record of {} bytes exceeds maximum {}",
            payload.len(),
            MAX_ENTRY_SIZE
        )));
    }
    Ok(payload)
}

fn checksum(lsn: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
