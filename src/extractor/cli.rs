//! CLI-based extractor runner using an external yt-dlp compatible binary

use super::parser::{OutputCollector, parse_progress};
use super::traits::{ExtractorRunner, OutputStream, RunEvent, RunOutcome, RunRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Binary name searched on `PATH` by [`CliExtractor::from_path`]
pub const DEFAULT_BINARY: &str = "yt-dlp";

/// Default limit for one run
const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60 * 60);

/// Buffered output lines between the pipe readers and the run loop
const LINE_BUFFER: usize = 256;

/// CLI-based extractor runner
///
/// Spawns the configured binary once per [`RunRequest`], streams both output pipes line
/// by line and enforces the maximum run duration. The child is killed on timeout, on
/// cancellation, and when the run future is dropped.
///
/// On Unix the extractor leads its own process group and the whole group is killed, so
/// post-processors it started (ffmpeg) die with it. Once the extractor itself exits, any
/// leftover group members are killed too so they cannot hold the output pipes open.
///
/// # Examples
///
/// ```no_run
/// use media_dl::extractor::CliExtractor;
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// // Explicit binary
/// let runner = CliExtractor::new(PathBuf::from("/usr/local/bin/yt-dlp"))
///     .with_max_duration(Duration::from_secs(1800));
///
/// // Or auto-discover from PATH
/// let runner = CliExtractor::from_path().expect("yt-dlp not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct CliExtractor {
    binary_path: PathBuf,
    max_duration: Duration,
}

impl CliExtractor {
    /// Create a runner for an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }

    /// Attempt to find `yt-dlp` in PATH
    pub fn from_path() -> Option<Self> {
        which::which(DEFAULT_BINARY).ok().map(Self::new)
    }

    /// Override the maximum wall-clock time of one run
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Binary this runner executes
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Maximum wall-clock time of one run
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }
}

#[async_trait]
impl ExtractorRunner for CliExtractor {
    async fn run(
        &self,
        request: RunRequest,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> crate::Result<RunOutcome> {
        let download_id = request.download_id;

        let mut command = Command::new(&self.binary_path);
        command
            .args(&request.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.as_std_mut().process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| {
                crate::Error::ExternalTool(format!(
                    "Failed to execute {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        let group = ProcessGroup::new(child.id());
        tracing::debug!(
            download_id = download_id.0,
            pid = ?child.id(),
            binary = ?self.binary_path,
            "extractor started"
        );

        let (line_tx, mut line_rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, OutputStream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, OutputStream::Stderr, line_tx);
        } else {
            drop(line_tx);
        }

        let deadline = tokio::time::sleep(self.max_duration);
        tokio::pin!(deadline);

        let mut collector = OutputCollector::new();
        let mut streams_open = true;
        let mut exit_status: Option<std::process::ExitStatus> = None;

        loop {
            if !streams_open && let Some(status) = exit_status {
                return Ok(collector.into_outcome(
                    status.success(),
                    status.code(),
                    &request.working_dir,
                ));
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    terminate(&mut child, &group, download_id).await;
                    tracing::info!(download_id = download_id.0, "extractor cancelled");
                    return Ok(RunOutcome::Cancelled);
                }

                _ = &mut deadline => {
                    terminate(&mut child, &group, download_id).await;
                    tracing::warn!(
                        download_id = download_id.0,
                        after = ?self.max_duration,
                        "extractor timed out"
                    );
                    return Ok(RunOutcome::TimedOut { after: self.max_duration });
                }

                received = line_rx.recv(), if streams_open => match received {
                    Some((stream, line)) => {
                        let event = match parse_progress(&line) {
                            Some(update) => RunEvent::Progress(update),
                            None => {
                                collector.observe(stream, &line);
                                RunEvent::Line { stream, line }
                            }
                        };
                        // The consumer may have gone away; the run still has to finish
                        let _ = events.send(event).await;
                    }
                    None => streams_open = false,
                },

                status = child.wait(), if exit_status.is_none() => {
                    let status = status.map_err(|e| {
                        crate::Error::ExternalTool(format!("Failed to wait for extractor: {}", e))
                    })?;
                    tracing::debug!(
                        download_id = download_id.0,
                        code = ?status.code(),
                        "extractor exited"
                    );
                    // Stragglers would keep the pipes open until the deadline
                    group.kill();
                    exit_status = Some(status);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }
}

/// Kill the extractor's process group and reap the extractor
async fn terminate(child: &mut Child, group: &ProcessGroup, download_id: crate::types::DownloadId) {
    group.kill();
    if let Err(e) = child.kill().await {
        tracing::warn!(
            download_id = download_id.0,
            error = %e,
            "failed to kill extractor"
        );
    }
}

/// Process group led by one extractor run, killed when dropped
///
/// Covers runs whose future is dropped mid-flight, where `kill_on_drop` alone would
/// only reach the extractor and leave its children running.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    leader: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { leader }
    }

    /// Send SIGKILL to every remaining member of the group
    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.leader.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return;
        };
        // SAFETY: kill(2) takes plain integers and touches no memory; a negative pid
        // addresses the group the extractor was spawned into with process_group(0)
        let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if result != 0 {
            let e = std::io::Error::last_os_error();
            // ESRCH: every member is already gone
            if e.raw_os_error() != Some(libc::ESRCH) {
                tracing::debug!(pgid, error = %e, "failed to kill extractor process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Forward every line of `reader` to `tx` until EOF
///
/// Reads raw bytes so invalid UTF-8 never stops the pipe from being drained, and splits
/// on carriage returns too since progress bars redraw in place.
fn spawn_line_reader<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<(OutputStream, String)>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    for piece in text.split(['\r', '\n']).filter(|p| !p.is_empty()) {
                        if tx.send((stream, piece.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(?stream, error = %e, "extractor output read failed");
                    break;
                }
            }
        }
    });
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DownloadId;

    #[test]
    fn test_from_path_consistency_with_which_crate() {
        let which_result = which::which(DEFAULT_BINARY);
        let from_path_result = CliExtractor::from_path();
        assert_eq!(which_result.is_ok(), from_path_result.is_some());
        if let (Ok(expected), Some(runner)) = (which_result, from_path_result) {
            assert_eq!(runner.binary_path(), expected.as_path());
        }
    }

    #[test]
    fn test_builder_overrides_duration() {
        let runner = CliExtractor::new(PathBuf::from("/bin/true"))
            .with_max_duration(Duration::from_secs(5));
        assert_eq!(runner.max_duration(), Duration::from_secs(5));
        assert_eq!(runner.name(), "cli-yt-dlp");
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_external_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CliExtractor::new(dir.path().join("no-such-extractor"));
        let (tx, _rx) = mpsc::channel(8);

        let result = runner
            .run(
                RunRequest {
                    download_id: DownloadId(1),
                    args: vec![],
                    working_dir: dir.path().to_path_buf(),
                },
                tx,
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(crate::Error::ExternalTool(_))));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, body).unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&path, permissions).unwrap();
        path
    }

    #[cfg(unix)]
    fn request(dir: &Path) -> RunRequest {
        RunRequest {
            download_id: DownloadId(1),
            args: vec![],
            working_dir: dir.to_path_buf(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_child_holding_stdout_does_not_delay_completion() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "#!/bin/sh\nsleep 30 &\nprintf 'audio' > track.opus\necho \"[filepath] track.opus\"\nexit 0\n",
        );
        let runner = CliExtractor::new(script).with_max_duration(Duration::from_secs(20));
        let (tx, _rx) = mpsc::channel(64);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            runner.run(request(dir.path()), tx, CancellationToken::new()),
        )
        .await
        .expect("run held open by a background child")
        .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                file_path: dir.path().join("track.opus")
            }
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancel_kills_extractor_children() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "#!/bin/sh\nsleep 30 &\necho $! > sleeper.pid\necho \"[download]   1.0% of 1.00MiB\"\nwait\n",
        );
        let runner = CliExtractor::new(script).with_max_duration(Duration::from_secs(60));
        let (tx, _rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let run = {
            let cancel = cancel.clone();
            let working_dir = dir.path().to_path_buf();
            tokio::spawn(async move { runner.run(request(&working_dir), tx, cancel).await })
        };

        let pid_file = dir.path().join("sleeper.pid");
        let pid = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(text) = std::fs::read_to_string(&pid_file)
                    && let Ok(pid) = text.trim().parse::<u32>()
                {
                    return pid;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("script never started its child");

        cancel.cancel();
        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);

        // Gone, or a zombie waiting for init to reap it
        let stat = format!("/proc/{}/stat", pid);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match std::fs::read_to_string(&stat) {
                Err(_) => break,
                Ok(text) if text.contains(") Z ") => break,
                Ok(_) => {
                    assert!(
                        tokio::time::Instant::now() < deadline,
                        "child {} of the extractor survived cancellation",
                        pid
                    );
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}
