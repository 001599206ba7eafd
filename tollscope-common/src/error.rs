//! Common error types for tollscope

use thiserror::Error;

/// Common result type for tollscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the tollscope crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error (record tables, dictionaries)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading error, including values of the wrong shape
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or parameter value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
