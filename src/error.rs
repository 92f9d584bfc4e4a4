//! Custom error types for pifinder.
//!
//! Only a failure of the initial listing fetch surfaces to callers of the
//! pipeline; per-trial failures (detail fetch, malformed record) are counted
//! and skipped inside the orchestrator. An empty extraction result for a
//! trial is not an error at all.

use thiserror::Error;

/// Main error type for pifinder operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum PiFinderError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rate limited by the registry
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Registry returned a non-success status
    #[error("Registry error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// Listing or page body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Query validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `PiFinderError`
pub type Result<T> = std::result::Result<T, PiFinderError>;
