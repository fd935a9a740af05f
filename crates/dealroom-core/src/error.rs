//! Error types for dealroom.

use thiserror::Error;

/// Result type alias using dealroom's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dealroom operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (question length, missing parameters). Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream rate limit hit; retry permitted after the countdown.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Stream broken before a terminal event was delivered.
    #[error("Transport interrupted: {0}")]
    TransportInterrupted(String),

    /// Corpus retrieval failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Answer generation failed
    #[error("Model error: {0}")]
    Model(String),

    /// Field extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Job orchestration error
    #[error("Job error: {0}")]
    Job(String),

    /// Query not found
    #[error("Query not found: {0}")]
    QueryNotFound(uuid::Uuid),

    /// Summary job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// State transition or write rejected (already finalized, backward transition)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Poller exceeded its bounded wait. The job may still be running.
    #[error("Poller timed out after {waited_secs}s")]
    PollerTimeout { waited_secs: u64 },

    /// Poller hit too many consecutive transient failures.
    #[error("Poller gave up after {attempts} consecutive failures: {last_error}")]
    PollerFailed { attempts: u32, last_error: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl Error {
    /// Whether a consumer may retry the operation that produced this error.
    ///
    /// Validation and conflict errors are never retryable; rate limits are
    /// retryable once the countdown elapses; transport and upstream failures
    /// are retryable unless classified otherwise at the call site.
    pub fn retry_allowed(&self) -> bool {
        match self {
            Error::Validation(_) | Error::Conflict(_) | Error::Config(_) => false,
            Error::QueryNotFound(_) | Error::JobNotFound(_) | Error::NotFound(_) => false,
            Error::RateLimited { .. }
            | Error::TransportInterrupted(_)
            | Error::Retrieval(_)
            | Error::Model(_)
            | Error::Extraction(_)
            | Error::Request(_) => true,
            _ => false,
        }
    }
}
