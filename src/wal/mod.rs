//! Write-Ahead Log (WAL) Module
//!
//! Provides durability for every write before it reaches the MemTable.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2 ...                             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! `Data` is the bincode-encoded operation plus its timestamp; the CRC
//! covers the LSN and `Data`. A batch is a single record, so a torn batch
//! is dropped as a whole on recovery.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
