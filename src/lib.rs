//! # atlasdown
//!
//! A dual-mode access layer over an ordered, persistent key-value store:
//! - Blocking and callback forms of every operation, sharing one core
//! - Paged cursors with byte-budgeted backpressure
//! - Atomic write batches
//! - Offline destroy and repair
//!
//! The bundled engine is AtlasKV: a write-ahead log, a MemTable and
//! immutable SSTables.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Database façade (sync + callback forms)             │
//! │      Cursor         Batch        maintenance::{destroy,     │
//! │                                             repair}         │
//! └──────────────┬──────────────────────────┬───────────────────┘
//!                │ EngineHandle             │ Executor
//!                │ NativeIterator           │ (workers + completion
//!                │                          │  thread)
//! ┌──────────────▼──────────────────────────▼───────────────────┐
//! │                        AtlasEngine                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (COW snap)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   ▼
//!                           ┌─────────────┐
//!                           │   Storage   │
//!                           │  (SSTable)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod options;
pub mod value;

pub mod memtable;
pub mod storage;
pub mod wal;

pub mod engine;
pub mod executor;

pub mod batch;
pub mod cursor;
pub mod db;
pub mod maintenance;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::Batch;
pub use config::{Config, WalSyncStrategy};
pub use cursor::{Cursor, CursorState, Entry};
pub use db::Database;
pub use engine::{
    AtlasEngine, BatchOp, EngineHandle, NativeIterator, Page, RangeOptions, SupportsBufferRead,
    SupportsBulkGet,
};
pub use error::{AtlasError, ErrorKind, Result};
pub use maintenance::{destroy, destroy_async, repair, repair_async, RepairReport};
pub use options::{
    GetBufferOptions, GetOptions, IteratorOptions, MultiGetOptions, ReadOptions, WriteOptions,
};
pub use value::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atlasdown
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
