//! Error types for vfscache
//!
//! Provides a unified error type for all storages.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for vfscache operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors (fail fast on open, never patched silently)
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    #[error("Storage [{path}] was not closed properly: recovery required")]
    NotClosedProperly { path: PathBuf },

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Id out of range: {0}")]
    Range(String),

    #[error("Capacity error: {0}")]
    Capacity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Record State Errors
    // -------------------------------------------------------------------------
    #[error("Record [{0}] is deleted")]
    Deleted(u64),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    // -------------------------------------------------------------------------
    // Data Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Maintenance Errors
    // -------------------------------------------------------------------------
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    /// True for errors that mean stored bytes can't be trusted (quarantine/rebuild)
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corruption(_))
    }
}

/// Fail an interrupted open after closing what it had already opened
///
/// `closed` holds the results of those closes; their failures are logged and the
/// open error is the one returned.
pub(crate) fn abandon_open<T>(
    error: StoreError,
    closed: impl IntoIterator<Item = Result<()>>,
) -> Result<T> {
    for result in closed {
        if let Err(close_error) = result {
            tracing::warn!(error = %close_error, "close after a failed open also failed");
        }
    }
    Err(error)
}
