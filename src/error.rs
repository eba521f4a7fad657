//! Error types for media-dl
//!
//! Only two kinds of failure surface as `Err` from the engine:
//! - validation failures on the way in (bad URL, bad page size, unknown id)
//! - infrastructure failures (database, I/O, spawning the extractor)
//!
//! A job whose extractor exits non-zero, times out or is cancelled is *not* an error at
//! this level. Those are reported as [`RunOutcome`](crate::extractor::RunOutcome) values
//! and end up persisted on the job record.

use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_downloads")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download state error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Rejected input (bad URL, unsupported provider, bad pagination)
    #[error("validation error: {0}")]
    Validation(String),

    /// External extractor could not be executed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from the persistence layer
    ///
    /// Store failures are the one per-job failure the worker cannot absorb: the job's
    /// state is unknown, so the cycle halts and the record stays at its last persisted
    /// state for recovery.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Sqlx(_))
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored value could not be decoded into a domain type
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Download state errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Download not found in the store
    #[error("download {id} not found")]
    NotFound {
        /// The download ID that was not found
        id: i64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} download {id} in state {current_state}")]
    InvalidState {
        /// The download ID that is in an invalid state for the operation
        id: i64,
        /// The operation that was attempted (e.g., "cancel", "retry", "complete")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },
}
