//! Error types for vslog
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using VslError
pub type Result<T> = std::result::Result<T, VslError>;

/// Unified error type for vslog operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VslError {
    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Query compile error: {0}")]
    QueryCompile(String),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("Log abandoned")]
    Abandoned,

    #[error("Log overrun")]
    Overrun,

    #[error("Unknown record format version: {version}")]
    UnknownFormat { version: u8 },

    #[error("Truncated record: {0}")]
    Truncated(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VslError {
    /// Whether the caller may retry the failed operation as-is.
    ///
    /// Only attach failures qualify; every other kind is fatal to the call
    /// that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VslError::Connection(_))
    }
}
