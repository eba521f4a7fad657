//! Shared test helpers: a scripted extractor runner and engine construction.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::extractor::{ExtractorRunner, ProgressUpdate, RunEvent, RunOutcome, RunRequest};
use crate::types::{Download, DownloadId, Event, Status};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// How a scripted run ends
pub(crate) enum Ending {
    /// Return this outcome after the hold time, unless cancelled first
    Outcome(RunOutcome),
    /// Block until the token fires
    UntilCancelled,
    /// Block until the token fires, then keep running anyway
    IgnoreCancel,
    /// Fail to spawn
    SpawnError,
}

/// Extractor stand-in that replays a fixed event script
pub(crate) struct FakeRunner {
    events: Vec<RunEvent>,
    ending: Ending,
    hold: Duration,
    requests: std::sync::Mutex<Vec<RunRequest>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRunner {
    fn with_ending(ending: Ending) -> Self {
        Self {
            events: Vec::new(),
            ending,
            hold: Duration::ZERO,
            requests: std::sync::Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn completing(file_path: &str) -> Self {
        Self::with_ending(Ending::Outcome(RunOutcome::Completed {
            file_path: PathBuf::from(file_path),
        }))
    }

    pub(crate) fn failing(message: &str, exit_code: i32) -> Self {
        Self::with_ending(Ending::Outcome(RunOutcome::Failed {
            message: message.to_string(),
            exit_code: Some(exit_code),
        }))
    }

    pub(crate) fn timing_out(after: Duration) -> Self {
        Self::with_ending(Ending::Outcome(RunOutcome::TimedOut { after }))
    }

    pub(crate) fn until_cancelled() -> Self {
        Self::with_ending(Ending::UntilCancelled)
    }

    pub(crate) fn ignoring_cancel() -> Self {
        Self::with_ending(Ending::IgnoreCancel)
    }

    pub(crate) fn spawn_error() -> Self {
        Self::with_ending(Ending::SpawnError)
    }

    pub(crate) fn with_events(mut self, events: Vec<RunEvent>) -> Self {
        self.events = events;
        self
    }

    pub(crate) fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Requests received so far
    pub(crate) fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of simultaneous runs observed
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractorRunner for FakeRunner {
    async fn run(
        &self,
        request: RunRequest,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        if matches!(self.ending, Ending::SpawnError) {
            return Err(Error::ExternalTool("failed to spawn fake: not found".into()));
        }

        self.requests.lock().unwrap().push(request);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        for event in &self.events {
            let _ = events.send(event.clone()).await;
        }

        let outcome = match &self.ending {
            Ending::Outcome(outcome) => tokio::select! {
                _ = cancel.cancelled() => RunOutcome::Cancelled,
                _ = tokio::time::sleep(self.hold) => outcome.clone(),
            },
            Ending::UntilCancelled => {
                cancel.cancelled().await;
                RunOutcome::Cancelled
            }
            Ending::IgnoreCancel => {
                cancel.cancelled().await;
                std::future::pending::<()>().await;
                RunOutcome::Cancelled
            }
            Ending::SpawnError => unreachable!(),
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A progress event as the CLI runner would emit it
pub(crate) fn progress(percent: f32) -> RunEvent {
    RunEvent::Progress(ProgressUpdate {
        percent,
        line: format!("[download]  {:.1}% of 4.20MiB at 1.00MiB/s ETA 00:03", percent),
        eta: Some("00:03".to_string()),
        speed: Some("1.00MiB/s".to_string()),
    })
}

/// Engine configuration rooted in a temp directory
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("test.db");
    config.download.download_dir = root.join("downloads");
    config.download.max_concurrent_downloads = 2;
    config.download.poll_interval = Duration::from_millis(200);
    config.download.shutdown_grace_period = Duration::from_secs(5);
    config
}

/// Create a test engine around `runner`. Returns the engine and the tempdir (which
/// must be kept alive).
pub(crate) async fn create_test_downloader(
    runner: Arc<FakeRunner>,
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let downloader = MediaDownloader::with_runner(config, runner).await.unwrap();
    (downloader, temp_dir)
}

/// Poll until the download reaches `status`
pub(crate) async fn wait_for_status(
    downloader: &MediaDownloader,
    id: DownloadId,
    status: Status,
) -> Download {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let download = downloader.get(id).await.unwrap();
        if download.status == status {
            return download;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "download {} stuck in {:?}, expected {:?}",
            id,
            download.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Collect events until `id` reaches a terminal status; the terminal event is last
///
/// Terminal events are emitted after the record and its log entry are written, so the
/// store is settled once this returns.
pub(crate) async fn wait_for_terminal(
    events: &mut broadcast::Receiver<Event>,
    id: DownloadId,
) -> Vec<Event> {
    let mut seen = Vec::new();
    let collect = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = matches!(
                        event,
                        Event::Completed { id: e, .. } | Event::Failed { id: e, .. } | Event::Cancelled { id: e }
                            if e == id
                    );
                    seen.push(event);
                    if done {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("download never reached a terminal status");
    seen
}
