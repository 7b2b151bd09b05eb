//! Error types for StrataKV
//!
//! Provides a unified error type for all operations. A point-lookup miss is
//! never an error: `get` returns `Ok(None)`.

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for StrataKV operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    /// Checksum mismatch or malformed on-disk structure
    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A file or database that must exist is missing
    #[error("Not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // Background Errors
    // -------------------------------------------------------------------------
    /// Sticky failure after background flush/compaction exhausted its retries
    #[error("Background error: {0}")]
    Background(String),
}

impl StrataError {
    pub fn corruption(msg: impl Into<String>) -> Self {
        StrataError::Corruption(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        StrataError::InvalidArgument(msg.into())
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, StrataError::Corruption(_) | StrataError::Serialization(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, StrataError::Io(_))
    }
}

impl Clone for StrataError {
    fn clone(&self) -> Self {
        match self {
            StrataError::Io(e) => StrataError::Io(std::io::Error::new(e.kind(), e.to_string())),
            StrataError::Corruption(m) => StrataError::Corruption(m.clone()),
            StrataError::Serialization(m) => StrataError::Serialization(m.clone()),
            StrataError::InvalidArgument(m) => StrataError::InvalidArgument(m.clone()),
            StrataError::NotFound(m) => StrataError::NotFound(m.clone()),
            StrataError::Background(m) => StrataError::Background(m.clone()),
        }
    }
}

impl From<bincode::Error> for StrataError {
    fn from(e: bincode::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}
