//! Storage Engine Error Types

use std::io;
use thiserror::Error;

/// Storage engine errors: WAL durability and the binary graph codec.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WAL entry failed to (de)serialize
    #[error("WAL entry serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Graph snapshot encode/decode failure (bad header, truncated section, ...)
    #[error("graph codec error: {0}")]
    Codec(String),

    /// Snapshot file carries a format version this build does not understand
    #[error("unsupported snapshot version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// WAL file is corrupt or truncated mid-entry
    #[error("corrupt WAL at byte offset {offset}: {reason}")]
    CorruptWal { offset: u64, reason: String },

    /// Generic error, used sparingly for conditions with no dedicated variant
    #[error("{0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
