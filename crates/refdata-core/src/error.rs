//! Error types for reference-data operations.
//!
//! This module defines [`RefDataError`] which covers all error cases that can
//! occur when fetching, transforming, or persisting reference-data artifacts.

use thiserror::Error;

/// Errors that can occur during reference-data operations.
#[derive(Error, Debug)]
pub enum RefDataError {
    /// The upstream market-data API failed (connection, HTTP status, decode).
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Rate limit exceeded by the upstream API.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// Error parsing an artifact or an upstream payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem error reading or writing an artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached artifact on disk is malformed.
    #[error("Corrupt artifact at {path}: {reason}")]
    Corrupt {
        /// Path of the bad file.
        path: String,
        /// Why the file could not be used.
        reason: String,
    },

    /// Required configuration is missing or invalid. Raised at init only.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using [`RefDataError`].
pub type Result<T> = std::result::Result<T, RefDataError>;
