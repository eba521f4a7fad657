//! Traits and types for running the external extractor

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::DownloadId;

/// One extractor invocation
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Job the run belongs to (used for tracing only)
    pub download_id: DownloadId,
    /// Full argument list, URL included
    pub args: Vec<String>,
    /// Directory the process runs in; relative output paths resolve against it
    pub working_dir: PathBuf,
}

/// A recognized progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage reported by the extractor (not yet clamped)
    pub percent: f32,
    /// The raw line the percentage was parsed from
    pub line: String,
    /// Remaining time as printed, if present
    pub eta: Option<String>,
    /// Transfer rate as printed, if present
    pub speed: Option<String>,
}

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Streamed while the process runs
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A progress marker was recognized
    Progress(ProgressUpdate),
    /// Any other output line
    Line {
        /// Source stream
        stream: OutputStream,
        /// Line text without the trailing newline
        line: String,
    },
}

/// How one extractor run ended
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Exit code 0 and the output file was resolved
    Completed {
        /// Absolute (or working-dir-relative, if the extractor printed one) output path
        file_path: PathBuf,
    },
    /// Non-zero exit, or exit 0 without a resolvable output file
    Failed {
        /// Last captured error line(s)
        message: String,
        /// Process exit code, if it exited normally
        exit_code: Option<i32>,
    },
    /// Maximum run duration exceeded; the process was killed
    TimedOut {
        /// The limit that was exceeded
        after: Duration,
    },
    /// The cancellation token fired; the process was killed
    Cancelled,
}

/// Executes one extractor invocation
///
/// Implementations stream [`RunEvent`]s on `events` as output arrives and must stop the
/// process promptly once `cancel` fires. A closed `events` receiver must not abort the
/// run. Only a failure to start the process is an `Err`; every way the process itself
/// can end is a [`RunOutcome`].
#[async_trait]
pub trait ExtractorRunner: Send + Sync {
    /// Run to completion, timeout or cancellation
    async fn run(
        &self,
        request: RunRequest,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> crate::Result<RunOutcome>;

    /// Short identifier for logs
    fn name(&self) -> &'static str;
}
