//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub i64);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DownloadId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<DownloadId> for i64 {
    fn from(id: DownloadId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for DownloadId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DownloadId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DownloadId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Download status
///
/// `Pending` and the terminal states are stable. `Downloading` is the only state with an
/// extractor process attached, and only the worker holding the claim moves a job out of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting to be claimed by a worker
    Pending,
    /// Claimed; an extractor process is running
    Downloading,
    /// Finished successfully, `file_path` is set
    Completed,
    /// Finished with an error, `error_message` is set
    Failed,
    /// Cancelled by an explicit request
    Cancelled,
}

impl Status {
    /// All statuses, in state machine order
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::Downloading,
        Status::Completed,
        Status::Failed,
        Status::Cancelled,
    ];

    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Option<Self> {
        match status {
            0 => Some(Status::Pending),
            1 => Some(Status::Downloading),
            2 => Some(Status::Completed),
            3 => Some(Status::Failed),
            4 => Some(Status::Cancelled),
            _ => None,
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Downloading => 1,
            Status::Completed => 2,
            Status::Failed => 3,
            Status::Cancelled => 4,
        }
    }

    /// Lowercase name, as used in messages and the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Downloading => "downloading",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }

    /// No transitions leave a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Failed | Status::Cancelled
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source platform; selects the output templates handed to the extractor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// bandcamp.com artist pages
    Bandcamp,
    /// YouTube / YouTube Music
    YoutubeMusic,
}

impl Provider {
    /// Stable identifier stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Bandcamp => "bandcamp",
            Provider::YoutubeMusic => "youtube_music",
        }
    }

    /// Infer the provider from a URL host
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_start_matches("www.").to_ascii_lowercase();
        if host == "bandcamp.com" || host.ends_with(".bandcamp.com") {
            Some(Provider::Bandcamp)
        } else if host == "youtube.com"
            || host == "music.youtube.com"
            || host == "m.youtube.com"
            || host == "youtu.be"
        {
            Some(Provider::YoutubeMusic)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bandcamp" => Ok(Provider::Bandcamp),
            "youtube_music" | "youtube" => Ok(Provider::YoutubeMusic),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// What the URL points at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single track
    #[default]
    Track,
    /// An album or playlist; tracks are numbered by playlist index
    Album,
}

impl TargetKind {
    /// Stable identifier stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Track => "track",
            TargetKind::Album => "album",
        }
    }

    /// Infer the target kind from a parsed URL
    pub fn from_url(url: &url::Url) -> Self {
        let is_album_path = url.path().contains("/album/") || url.path().starts_with("/playlist");
        let has_list = url.query_pairs().any(|(k, _)| k == "list");
        if is_album_path || has_list {
            TargetKind::Album
        } else {
            TargetKind::Track
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(TargetKind::Track),
            "album" | "playlist" => Ok(TargetKind::Album),
            other => Err(format!("unknown target kind '{}'", other)),
        }
    }
}

/// Category of a download log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    /// Job was created
    Queued,
    /// A worker claimed the job
    Started,
    /// Persisted progress change
    Progress,
    /// Non-fatal notice (extractor warnings, requeues)
    Warning,
    /// Job failed
    Error,
    /// Job completed
    Completed,
    /// Job was cancelled
    Cancelled,
}

impl LogEventType {
    /// Stable identifier stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEventType::Queued => "queued",
            LogEventType::Started => "started",
            LogEventType::Progress => "progress",
            LogEventType::Warning => "warning",
            LogEventType::Error => "error",
            LogEventType::Completed => "completed",
            LogEventType::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for LogEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(LogEventType::Queued),
            "started" => Ok(LogEventType::Started),
            "progress" => Ok(LogEventType::Progress),
            "warning" => Ok(LogEventType::Warning),
            "error" => Ok(LogEventType::Error),
            "completed" => Ok(LogEventType::Completed),
            "cancelled" => Ok(LogEventType::Cancelled),
            other => Err(format!("unknown log event type '{}'", other)),
        }
    }
}

/// A download job as exposed to callers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Download {
    /// Unique identifier
    pub id: DownloadId,
    /// Source URL
    pub url: String,
    /// Source platform
    pub provider: Provider,
    /// Track or album
    pub target: TargetKind,
    /// Current status
    pub status: Status,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Set only when `status` is failed or cancelled
    pub error_message: Option<String>,
    /// Set only when `status` is completed
    pub file_path: Option<PathBuf>,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
    /// When a worker claimed the job
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

/// One append-only log entry belonging to a download
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    /// Unique identifier
    pub id: i64,
    /// Owning download
    pub download_id: DownloadId,
    /// Category
    pub event_type: LogEventType,
    /// Human-readable text
    pub message: String,
    /// Optional structured attributes (parsed percentage, ETA, ...)
    pub metadata: Option<serde_json::Value>,
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
}

/// One page of results plus the total number of matching records
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of matching records, independent of paging
    pub total: i64,
    /// Zero-based page index
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
}

/// Per-status job counts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total number of jobs
    pub total: i64,
    /// Jobs waiting to be claimed
    pub pending: i64,
    /// Jobs with a running extractor
    pub downloading: i64,
    /// Completed jobs
    pub completed: i64,
    /// Failed jobs
    pub failed: i64,
    /// Cancelled jobs
    pub cancelled: i64,
}

/// Options for enqueueing a download
///
/// Anything left `None` is inferred from the URL.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Source platform
    #[serde(default)]
    pub provider: Option<Provider>,
    /// Track or album
    #[serde(default)]
    pub target: Option<TargetKind>,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Download added to the queue
    Queued {
        /// Download ID
        id: DownloadId,
        /// Source URL
        url: String,
    },

    /// A worker claimed the download
    Started {
        /// Download ID
        id: DownloadId,
    },

    /// Persisted progress change
    Progress {
        /// Download ID
        id: DownloadId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
    },

    /// Download completed
    Completed {
        /// Download ID
        id: DownloadId,
        /// Resolved output file
        file_path: PathBuf,
    },

    /// Download failed
    Failed {
        /// Download ID
        id: DownloadId,
        /// Error message
        error: String,
    },

    /// Download cancelled
    Cancelled {
        /// Download ID
        id: DownloadId,
    },

    /// Download returned to pending (shutdown interruption or stale claim)
    Requeued {
        /// Download ID
        id: DownloadId,
    },

    /// Engine shut down
    Shutdown,
}
