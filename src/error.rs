//! Error types for undbpf

use thiserror::Error;

/// Main error type for undbpf operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid DBPF file: {0}")]
    Format(String),

    #[error("Truncated archive: {0}")]
    Truncated(String),

    #[error("Corrupt compressed data: {0}")]
    Corruption(String),

    #[error("Malformed property stream at offset {offset:#x}: {reason}")]
    Decode { offset: usize, reason: String },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for undbpf operations
pub type Result<T> = std::result::Result<T, Error>;
