//! Error types for the presence monitor
//!
//! This module defines all error types used throughout the crate. None of
//! these errors are fatal to a running registry: they are logged at the point
//! where they occur and surface to callers only as empty query results.

use thiserror::Error;

/// Result type alias for presence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the presence monitor
#[derive(Error, Debug)]
pub enum Error {
    /// Complex key does not match any configured complex
    #[error("Complex not found: {0}")]
    Resolution(String),

    /// Snapshot store read/write failures
    #[error("State store error: {0}")]
    StateStore(String),

    /// Snapshot payload is empty or cannot be applied
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// External notification send failures
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key not present in the snapshot store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a complex resolution error
    pub fn resolution(key: impl Into<String>) -> Self {
        Self::Resolution(key.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a dispatch error
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
