//! Download job engine split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Enqueueing and read operations (get, list, logs, stats)
//! - [`control`] - Single-job control (cancel, retry)
//! - [`lifecycle`] - Startup recovery and graceful shutdown
//! - [`queue_processor`] - The worker loop: claiming jobs under the concurrency limit
//! - [`job`] - One job's cycle from claim to terminal status
//! - [`maintenance`] - Log retention and stale-claim recovery

mod control;
mod job;
mod lifecycle;
mod maintenance;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use maintenance::MaintenanceReport;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, Notify, Semaphore, broadcast};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extractor::{CliExtractor, ExtractorRunner};
use crate::store::{DownloadLogStore, DownloadStore};
use crate::types::{DownloadId, Event};

/// Handle on one running job
pub(crate) struct ActiveJob {
    /// Child of the engine shutdown token; cancelling it kills the extractor
    pub(crate) token: CancellationToken,
    /// Set by `cancel()` so the job ends as cancelled rather than re-queued
    pub(crate) user_cancelled: Arc<AtomicBool>,
    /// Used to force-stop the task once the shutdown grace period is over
    pub(crate) abort: Option<AbortHandle>,
}

/// Queue and job state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Bounds the number of simultaneously running extractor processes
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Jobs currently holding a claim in this engine
    ///
    /// Claims are registered while this lock is held, so `cancel()` always sees either
    /// the pending record or the registered job, never the gap in between.
    pub(crate) active_downloads: Arc<Mutex<HashMap<DownloadId, ActiveJob>>>,
    /// Cleared once `stop()` begins
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Wakes the worker loop when a job is enqueued
    pub(crate) wake: Arc<Notify>,
}

/// Background tasks owned by the engine
#[derive(Clone)]
pub(crate) struct Background {
    /// Engine-wide shutdown trigger; every job token is a child of it
    pub(crate) shutdown: CancellationToken,
    /// Set by the first `start()`
    pub(crate) started: Arc<AtomicBool>,
    /// Worker loop and maintenance task handles, joined by `stop()`
    pub(crate) tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// Download job engine (cloneable - all fields are Arc-wrapped)
///
/// Owns the database handle, the extractor runner, the worker loop and the maintenance
/// task. Nothing runs until [`start`](Self::start); [`stop`](Self::stop) tears all of it
/// down again.
#[derive(Clone)]
pub struct MediaDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to inspect records directly
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Runs the external extractor (trait object for pluggable implementations)
    pub(crate) runner: Arc<dyn ExtractorRunner>,
    /// Queue and job state management
    pub(crate) queue_state: QueueState,
    /// Background tasks and shutdown signalling
    pub(crate) background: Background,
}

impl MediaDownloader {
    /// Create a new MediaDownloader using the configured extractor binary
    ///
    /// Uses `extractor_path` when set, otherwise searches `PATH` for `yt-dlp` if
    /// `search_path` is enabled.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] if no extractor binary can be found, plus everything
    /// [`with_runner`](Self::with_runner) can return.
    pub async fn new(config: Config) -> Result<Self> {
        let extractor = if let Some(ref path) = config.tools.extractor_path {
            CliExtractor::new(path.clone())
        } else if config.tools.search_path {
            CliExtractor::from_path().ok_or_else(|| {
                Error::NotSupported(format!(
                    "{} not found in PATH; set extractor_path",
                    crate::extractor::DEFAULT_BINARY
                ))
            })?
        } else {
            return Err(Error::NotSupported(
                "no extractor_path configured and PATH search disabled".to_string(),
            ));
        };
        let extractor = extractor.with_max_duration(config.download.max_run_duration);

        tracing::info!(binary = ?extractor.binary_path(), "Extractor initialized");

        Self::with_runner(config, Arc::new(extractor)).await
    }

    /// Create a new MediaDownloader with any [`ExtractorRunner`]
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the output root
    /// - Opens/creates the SQLite database and runs migrations
    /// - Sets up the event broadcast channel
    pub async fn with_runner(config: Config, runner: Arc<dyn ExtractorRunner>) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        let db = Database::new(&config.persistence.database_path).await?;

        // Buffer generously so slow subscribers lag instead of blocking jobs
        let (event_tx, _rx) = broadcast::channel(1000);

        let queue_state = QueueState {
            concurrent_limit: Arc::new(Semaphore::new(config.download.max_concurrent_downloads)),
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        };

        let background = Background {
            shutdown: CancellationToken::new(),
            started: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        };

        tracing::info!(
            runner = runner.name(),
            max_concurrent = config.download.max_concurrent_downloads,
            download_dir = ?config.download_dir(),
            "MediaDownloader initialized"
        );

        Ok(Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            runner,
            queue_state,
            background,
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently. A subscriber that falls more than 1000 events behind receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Record store used by the engine
    pub(crate) fn store(&self) -> &dyn DownloadStore {
        &*self.db
    }

    /// Log store used by the engine
    pub(crate) fn log_store(&self) -> &dyn DownloadLogStore {
        &*self.db
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
