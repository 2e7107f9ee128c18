//! Error types for atlasdown
//!
//! One error enum for the whole crate. Every variant maps onto a stable
//! [`ErrorKind`], which is what callers match on; the variant itself keeps
//! the engine-level detail for the message.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for atlasdown operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // Caller Errors (raised before any engine work is queued)
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("NotFound: {0}")]
    NotFound(String),

    #[error("Buffer too small: value needs {needed} bytes, {available} available")]
    BufferTooSmall { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Released Resources
    // -------------------------------------------------------------------------
    #[error("Database is not open")]
    Closed,

    #[error("Iterator has ended")]
    IteratorClosed,

    #[error("write() already called on this batch")]
    BatchClosed,

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Stable classification of an [`AtlasError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    IoError,
    Closed,
    IteratorClosed,
    BatchClosed,
    BufferTooSmall,
}

impl ErrorKind {
    /// Stable, human-facing name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgumentError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::IoError => "IOError",
            ErrorKind::Closed => "ClosedError",
            ErrorKind::IteratorClosed => "IteratorClosedError",
            ErrorKind::BatchClosed => "BatchClosedError",
            ErrorKind::BufferTooSmall => "BufferTooSmallError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl AtlasError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AtlasError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AtlasError::NotFound(_) => ErrorKind::NotFound,
            AtlasError::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            AtlasError::Closed => ErrorKind::Closed,
            AtlasError::IteratorClosed => ErrorKind::IteratorClosed,
            AtlasError::BatchClosed => ErrorKind::BatchClosed,
            AtlasError::Io(_)
            | AtlasError::WalCorruption(_)
            | AtlasError::WalWrite(_)
            | AtlasError::Storage(_)
            | AtlasError::Serialization(_) => ErrorKind::IoError,
        }
    }

    /// Shorthand for a single-key miss
    pub(crate) fn not_found(key: &[u8]) -> Self {
        AtlasError::NotFound(format!("key {:?} not found", String::from_utf8_lossy(key)))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AtlasError::InvalidArgument(message.into())
    }

    /// True if this is a single-key miss
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
