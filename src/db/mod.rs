//! Database layer for media-dl
//!
//! Handles SQLite persistence for download records and their logs.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`downloads`] - Download records: creation, claiming, state transitions, queries
//! - [`logs`] - Append-only per-download log entries and retention pruning
//! - [`state`] - Runtime state (clean shutdown tracking)
//!
//! Every state transition is a single guarded SQL statement, so the database is the one
//! synchronization point between concurrently running jobs.

use crate::error::DatabaseError;
use crate::types::{Download, DownloadId, DownloadLogEntry, LogEventType, Provider, Status, TargetKind};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod downloads;
mod logs;
mod migrations;
mod state;

/// New download to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewDownload {
    /// Source URL
    pub url: String,
    /// Source platform
    pub provider: Provider,
    /// Track or album
    pub target: TargetKind,
}

/// Download record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRow {
    /// Unique database ID
    pub id: i64,
    /// Source URL
    pub url: String,
    /// Provider identifier
    pub provider: String,
    /// Target kind identifier
    pub target: String,
    /// Status code (see [`Status::to_i32`])
    pub status: i32,
    /// Progress percentage (0.0-100.0)
    pub progress: f32,
    /// Error message if the download failed or was cancelled
    pub error_message: Option<String>,
    /// Resolved output file once completed
    pub file_path: Option<String>,
    /// Unix timestamp when the download was created
    pub created_at: i64,
    /// Unix timestamp when a worker claimed the download
    pub started_at: Option<i64>,
    /// Unix timestamp when the download reached a terminal status
    pub finished_at: Option<i64>,
    /// Unix timestamp of the last heartbeat from the claiming worker
    pub updated_at: i64,
}

impl TryFrom<DownloadRow> for Download {
    type Error = DatabaseError;

    fn try_from(row: DownloadRow) -> Result<Self, Self::Error> {
        let status = Status::from_i32(row.status).ok_or_else(|| {
            DatabaseError::CorruptRecord(format!(
                "download {} has unknown status {}",
                row.id, row.status
            ))
        })?;
        let provider = row
            .provider
            .parse::<Provider>()
            .map_err(|e| DatabaseError::CorruptRecord(format!("download {}: {}", row.id, e)))?;
        let target = row
            .target
            .parse::<TargetKind>()
            .map_err(|e| DatabaseError::CorruptRecord(format!("download {}: {}", row.id, e)))?;

        Ok(Download {
            id: DownloadId(row.id),
            url: row.url,
            provider,
            target,
            status,
            progress: row.progress,
            error_message: row.error_message,
            file_path: row.file_path.map(PathBuf::from),
            created_at: timestamp(row.created_at),
            started_at: row.started_at.map(timestamp),
            finished_at: row.finished_at.map(timestamp),
        })
    }
}

/// New log entry to be appended
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    /// Owning download
    pub download_id: DownloadId,
    /// Category
    pub event_type: LogEventType,
    /// Human-readable text
    pub message: String,
    /// Optional structured attributes
    pub metadata: Option<serde_json::Value>,
}

impl NewLogEntry {
    /// Log entry without metadata
    pub fn new(download_id: DownloadId, event_type: LogEventType, message: impl Into<String>) -> Self {
        Self {
            download_id,
            event_type,
            message: message.into(),
            metadata: None,
        }
    }

    /// Attach structured metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Log entry record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct LogRow {
    /// Unique database ID
    pub id: i64,
    /// Owning download
    pub download_id: i64,
    /// Event type identifier
    pub event_type: String,
    /// Human-readable text
    pub message: String,
    /// JSON-encoded metadata
    pub metadata: Option<String>,
    /// Unix timestamp when the entry was written
    pub created_at: i64,
}

impl TryFrom<LogRow> for DownloadLogEntry {
    type Error = DatabaseError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let event_type = row
            .event_type
            .parse::<LogEventType>()
            .map_err(|e| DatabaseError::CorruptRecord(format!("log {}: {}", row.id, e)))?;
        let metadata = match row.metadata {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                DatabaseError::CorruptRecord(format!("log {} metadata: {}", row.id, e))
            })?),
            None => None,
        };

        Ok(DownloadLogEntry {
            id: row.id,
            download_id: DownloadId(row.download_id),
            event_type,
            message: row.message,
            metadata,
            timestamp: timestamp(row.created_at),
        })
    }
}

/// Column list shared by every query that materializes a [`DownloadRow`]
pub(crate) const DOWNLOAD_COLUMNS: &str = "id, url, provider, target, status, progress, \
     error_message, file_path, created_at, started_at, finished_at, updated_at";

/// Wrap a sqlx error with the operation that failed
fn query_failed(operation: &'static str) -> impl FnOnce(sqlx::Error) -> crate::Error {
    move |e| crate::Error::Database(DatabaseError::QueryFailed(format!("Failed to {}: {}", operation, e)))
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Database handle for media-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
