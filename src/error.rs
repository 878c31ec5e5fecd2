//! Error taxonomy for the index storage and query-evaluation engine.
//!
//! One returned, tagged `CoreError` replaces the original design's
//! process-global error buffer (see spec §9): every layer reports failure
//! through its own `Result`, and build/merge are atomic — either the new
//! superblock is committed or the previous index is left byte-for-byte
//! intact.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input: bad vbyte, bucket overflow, state-machine misuse.
    #[error("invalid input: {0}")]
    Inval(String),

    /// Allocation failure. Always propagated from a mutating operation;
    /// optional caches may recover locally by proceeding uncached.
    #[error("out of memory: {0}")]
    NoMem(String),

    /// Underlying read/write failed.
    #[error("I/O error: {0}")]
    Eio(#[from] std::io::Error),

    /// Vocabulary lookup / bucket key miss.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bucket insert collided with an existing key.
    #[error("already exists: {0}")]
    Exists(String),

    /// Integer decoded past the target width.
    #[error("integer overflow decoding {0}")]
    Overflow(String),

    /// Record would not fit in any bucket of the configured page size.
    #[error("record too big for page: {0}")]
    TooBig(String),

    /// An on-disk invariant (sibling threading, strictly-increasing keys,
    /// strictly-increasing docnos, checksum) did not hold on read.
    #[error("corrupted index state: {0}")]
    Corruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
}

impl From<bincode::Error> for CoreError {
    fn from(err: bincode::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
