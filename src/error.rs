//! Error types for the clipvocab pipeline.
//!
//! Uses `thiserror` for structured error definitions, one enum per concern.
//! Entry-level problems (duplicates, sentences, failed lookups) are not errors
//! here; they are counted in the batch report instead.

use std::time::Duration;
use thiserror::Error;

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error returned by an enrichment backend call.
///
/// A negative lookup is not an error; see [`crate::backends::Lookup::NotFound`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not finish within the configured timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Server asked us to slow down (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Temporary server-side failure (HTTP 5xx)
    #[error("Server error: {0}")]
    Unavailable(String),

    /// Credentials rejected or quota permanently exhausted
    #[error("Backend rejected request: {0}")]
    Fatal(String),

    /// Response body could not be understood
    #[error("Failed to parse backend response: {0}")]
    ParseError(String),
}

impl BackendError {
    /// Whether the call may succeed if repeated after a short pause.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BackendError::Timeout(_) => true,
            BackendError::RateLimited(_) => true,
            BackendError::Unavailable(_) => true,
            BackendError::Fatal(_) => false,
            BackendError::ParseError(_) => false,
        }
    }

    /// Whether the backend should be disabled for the rest of the batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Fatal(_))
    }
}

/// Error type for the persistent history store.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Failed to read or write the history file
    #[error("History I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// History file is not valid JSON
    #[error("Failed to parse history: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Error type for the translation cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to read or write the cache file
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file is not valid JSON
    #[error("Failed to parse cache: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Error type for CSV emission. Always fatal for the batch.
#[derive(Error, Debug)]
pub enum EmitError {
    /// An entry without a translation reached the emitter
    #[error("Entry '{text}' from '{book}' has an empty translation")]
    EmptyTranslation { book: String, text: String },

    /// CSV serialization failed
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the CSV buffer failed
    #[error("CSV buffer error: {0}")]
    Buffer(String),

    /// Writing the CSV file failed
    #[error("Failed to write CSV file: {0}")]
    Io(#[from] std::io::Error),
}

/// Batch-level failure surfaced to the invoking collaborator.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// History lookup or commit failed
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Output could not be produced
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
