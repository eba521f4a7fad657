//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Download behavior configuration (output root, concurrency, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output root the extractor runs in (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent extractor processes (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// How long the worker loop sleeps when no pending job exists (default: 5 seconds)
    ///
    /// Enqueueing through the engine wakes the loop immediately; the poll only matters
    /// for jobs inserted into the database by another process.
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Maximum wall-clock time for one extractor run (default: 1 hour)
    #[serde(default = "default_max_run_duration", with = "duration_serde")]
    pub max_run_duration: Duration,

    /// How long `stop()` waits for in-flight jobs after cancelling them (default: 30 seconds)
    #[serde(default = "default_shutdown_grace_period", with = "duration_serde")]
    pub shutdown_grace_period: Duration,

    /// Minimum progress delta, in percentage points, worth persisting (default: 1.0)
    #[serde(default = "default_progress_step")]
    pub progress_step: f32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            poll_interval: default_poll_interval(),
            max_run_duration: default_max_run_duration(),
            shutdown_grace_period: default_shutdown_grace_period(),
            progress_step: default_progress_step(),
        }
    }
}

/// External extractor configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the extractor executable (auto-detected if None)
    #[serde(default)]
    pub extractor_path: Option<PathBuf>,

    /// Whether to search PATH for the extractor if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Arguments appended to every invocation (JS runtime, cookie source, proxy, ...)
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            extractor_path: None,
            search_path: true,
            extra_args: vec![],
        }
    }
}

/// Data storage and retention configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./media-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Log entries older than this many days are pruned (default: 30)
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// Interval between retention/recovery sweeps (default: 6 hours)
    #[serde(default = "default_prune_interval", with = "duration_serde")]
    pub prune_interval: Duration,

    /// A downloading job whose heartbeat is older than this is considered orphaned
    /// and returned to pending (default: 15 minutes)
    #[serde(default = "default_stale_claim_after", with = "duration_serde")]
    pub stale_claim_after: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_retention_days: default_log_retention_days(),
            prune_interval: default_prune_interval(),
            stale_claim_after: default_stale_claim_after(),
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) - output root, concurrency, timeouts
/// - [`tools`](ToolsConfig) - extractor binary and extra arguments
/// - [`persistence`](PersistenceConfig) - database, log retention, claim recovery
///
/// `download` and `tools` are flattened, so their keys sit at the top level of the
/// JSON document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External extractor settings
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(config_error(
                "max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        for (key, value) in [
            ("poll_interval", self.download.poll_interval),
            ("max_run_duration", self.download.max_run_duration),
            ("prune_interval", self.persistence.prune_interval),
            ("stale_claim_after", self.persistence.stale_claim_after),
        ] {
            if value.is_zero() {
                return Err(config_error(key, "must be greater than zero"));
            }
        }
        let step = self.download.progress_step;
        if !step.is_finite() || !(0.0..=100.0).contains(&step) {
            return Err(config_error(
                "progress_step",
                "must be a percentage between 0 and 100",
            ));
        }
        Ok(())
    }

    /// Output root directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

fn config_error(key: &str, message: &str) -> Error {
    Error::Config {
        message: format!("{} {}", key, message),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    2
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_run_duration() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_shutdown_grace_period() -> Duration {
    Duration::from_secs(30)
}

fn default_progress_step() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("media-dl.db")
}

fn default_log_retention_days() -> u32 {
    30
}

fn default_prune_interval() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

fn default_stale_claim_after() -> Duration {
    Duration::from_secs(15 * 60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
