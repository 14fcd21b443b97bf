//! Error types for ccp-sync
//!
//! Run-aborting errors are [`SyncError`] variants. [`RemoteCallError`] is
//! recorded per row by the fetcher and never aborts a run.

use thiserror::Error;

/// Main error type for a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Read, write or connection failure at the store boundary
    #[error("Store error: {0}")]
    Store(String),

    /// Remote response did not match the configured envelope, or a value could
    /// not be normalized
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid or missing configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// ccp-common error
    #[error("Common error: {0}")]
    Common(#[from] ccp_common::Error),
}

impl SyncError {
    /// Error class name used in log output
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Store(_) => "StoreError",
            SyncError::Processing(_) => "ProcessingError",
            SyncError::Configuration(_) | SyncError::Common(_) => "ConfigurationError",
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<tiberius::error::Error> for SyncError {
    fn from(err: tiberius::error::Error) -> Self {
        SyncError::Store(err.to_string())
    }
}

/// Failure of a single remote call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteCallError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience Result type using ccp-sync SyncError
pub type Result<T> = std::result::Result<T, SyncError>;
