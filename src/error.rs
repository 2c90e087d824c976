//! Error types for the Glaive library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`GlaiveError`] enum. The first four variants follow the engine's error
//! taxonomy (see [`ErrorKind`]); the rest wrap failures coming from the
//! surrounding stack (I/O, serialization).
//!
//! # Examples
//!
//! ```
//! use glaive::error::{ErrorKind, GlaiveError, Result};
//!
//! fn check_section(sid: u32) -> Result<u32> {
//!     if sid == 0 {
//!         return Err(GlaiveError::invalid_argument("section must be positive"));
//!     }
//!     Ok(sid)
//! }
//!
//! let err = check_section(0).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::InvalidArgument);
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Glaive operations.
#[derive(Error, Debug)]
pub enum GlaiveError {
    /// Bad key, term, mode or option passed by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failed (segment, chunk or working set).
    #[error("Memory exhausted: {0}")]
    MemoryExhausted(String),

    /// Corrupted cursor or list state detected at runtime.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A persisted structure failed a sanity check.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O errors (file operations, mapping)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Binary serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Coarse classification of a [`GlaiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    MemoryExhausted,
    Internal,
    InvalidFormat,
    Io,
    Other,
}

/// Result type alias for operations that may fail with GlaiveError.
pub type Result<T> = std::result::Result<T, GlaiveError>;

impl GlaiveError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        GlaiveError::InvalidArgument(msg.into())
    }

    /// Create a new memory exhausted error.
    pub fn memory_exhausted<S: Into<String>>(msg: S) -> Self {
        GlaiveError::MemoryExhausted(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        GlaiveError::Internal(msg.into())
    }

    /// Create a new invalid format error.
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        GlaiveError::InvalidFormat(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        GlaiveError::Storage(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        GlaiveError::Other(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GlaiveError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GlaiveError::MemoryExhausted(_) => ErrorKind::MemoryExhausted,
            GlaiveError::Internal(_) => ErrorKind::Internal,
            GlaiveError::InvalidFormat(_) | GlaiveError::Serialization(_) => {
                ErrorKind::InvalidFormat
            }
            GlaiveError::Io(_) | GlaiveError::Storage(_) => ErrorKind::Io,
            GlaiveError::Json(_) | GlaiveError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether the error means the caller may retry after freeing resources.
    pub fn is_memory_exhausted(&self) -> bool {
        self.kind() == ErrorKind::MemoryExhausted
    }
}
