//! One job's cycle: claim → extractor run → terminal status.
//!
//! Everything a job learns is persisted through the two stores as it happens. The only
//! failure that stops a cycle early is a store failure (or a lost claim); the record is
//! then left at whatever was last persisted and the stale-claim sweep recovers it.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::command;
use crate::db::NewLogEntry;
use crate::error::{DownloadError, Error, Result};
use crate::extractor::parser::is_warning_line;
use crate::extractor::{ProgressUpdate, RunEvent, RunOutcome, RunRequest};
use crate::types::{Download, DownloadId, Event, LogEventType};

use super::MediaDownloader;
use super::control::CANCELLED_MESSAGE;
use super::maintenance::claim_period;

/// Buffered runner events per job
const EVENT_BUFFER: usize = 64;

/// A claimed job handed from the worker loop to its task
pub(crate) struct ClaimedJob {
    /// Record as returned by the claim
    pub(crate) download: Download,
    /// Cancels this job's extractor
    pub(crate) token: CancellationToken,
    /// Set when the cancellation came from `cancel()`
    pub(crate) user_cancelled: Arc<AtomicBool>,
}

impl MediaDownloader {
    /// Run one claimed job to its end and release its active slot
    pub(crate) async fn run_job(&self, job: ClaimedJob) {
        let id = job.download.id;
        let token = job.token.clone();

        if let Err(e) = self.drive_job(job).await {
            tracing::error!(
                download_id = id.0,
                error = %e,
                "Download job halted; record left at its last persisted state"
            );
            token.cancel();
        }

        self.queue_state.active_downloads.lock().await.remove(&id);
    }

    async fn drive_job(&self, job: ClaimedJob) -> Result<()> {
        let ClaimedJob {
            download,
            token,
            user_cancelled,
        } = job;
        let id = download.id;

        self.log_store()
            .append(
                &NewLogEntry::new(id, LogEventType::Started, "download started").with_metadata(
                    json!({
                        "provider": download.provider.as_str(),
                        "target": download.target.as_str(),
                        "runner": self.runner.name(),
                    }),
                ),
            )
            .await?;
        self.emit_event(Event::Started { id });

        let request = RunRequest {
            download_id: id,
            args: command::invocation(
                download.provider,
                download.target,
                &self.config.tools.extra_args,
                &download.url,
            ),
            working_dir: self.config.download_dir().clone(),
        };
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let (outcome, consumed) = tokio::join!(
            self.runner.run(request, events_tx, token.clone()),
            self.consume_run_events(id, events_rx, &token),
        );
        consumed?;

        match outcome {
            Ok(RunOutcome::Completed { file_path }) => self.finish_completed(id, &file_path).await,
            Ok(RunOutcome::Failed { message, exit_code }) => {
                self.finish_failed(id, &message, json!({ "exit_code": exit_code }))
                    .await
            }
            Ok(RunOutcome::TimedOut { after }) => {
                let message = format!("timed out after {} s", after.as_secs());
                self.finish_failed(id, &message, json!({ "timeout_secs": after.as_secs() }))
                    .await
            }
            Ok(RunOutcome::Cancelled) if user_cancelled.load(Ordering::SeqCst) => {
                self.finish_cancelled(id).await
            }
            Ok(RunOutcome::Cancelled) => self.finish_interrupted(id).await,
            // The extractor never started; nothing to clean up, so it fails like any run
            Err(e) if !e.is_store_failure() => {
                self.finish_failed(id, &e.to_string(), json!({})).await
            }
            Err(e) => Err(e),
        }
    }

    /// Persist progress and warnings while the extractor runs, heartbeating the claim
    ///
    /// Returns when the runner closes its event channel. On error the job's token is
    /// cancelled so the extractor stops too.
    async fn consume_run_events(
        &self,
        id: DownloadId,
        mut events: mpsc::Receiver<RunEvent>,
        token: &CancellationToken,
    ) -> Result<()> {
        let period = claim_period(self.config.persistence.stale_claim_after);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_persisted = 0.0_f32;

        let result: Result<()> = async {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(RunEvent::Progress(update)) => {
                            self.record_progress(id, &update, &mut last_persisted).await?;
                        }
                        Some(RunEvent::Line { stream, line }) => {
                            if is_warning_line(&line) {
                                self.log_store()
                                    .append(&NewLogEntry::new(id, LogEventType::Warning, line.trim()))
                                    .await?;
                            } else {
                                tracing::debug!(download_id = id.0, ?stream, line = %line, "extractor output");
                            }
                        }
                        None => return Ok(()),
                    },
                    _ = heartbeat.tick() => {
                        if !self.store().heartbeat(id).await? {
                            return Err(lost_claim(id));
                        }
                    }
                }
            }
        }
        .await;

        if result.is_err() {
            token.cancel();
        }
        result
    }

    /// Persist a progress reading if it moved far enough since the last persisted one
    async fn record_progress(
        &self,
        id: DownloadId,
        update: &ProgressUpdate,
        last_persisted: &mut f32,
    ) -> Result<()> {
        if !update.percent.is_finite() {
            return Ok(());
        }
        let percent = update.percent.clamp(0.0, 100.0);
        let step = self.config.download.progress_step;

        let reached_end = percent >= 100.0 && *last_persisted < 100.0;
        let moved = percent > *last_persisted && percent >= *last_persisted + step;
        if !reached_end && !moved {
            return Ok(());
        }

        self.store().update_progress(id, percent).await?;
        self.log_store()
            .append(
                &NewLogEntry::new(id, LogEventType::Progress, update.line.trim()).with_metadata(
                    json!({
                        "percent": percent,
                        "eta": update.eta,
                        "speed": update.speed,
                    }),
                ),
            )
            .await?;
        *last_persisted = percent;

        tracing::debug!(download_id = id.0, percent, "Progress persisted");
        self.emit_event(Event::Progress { id, percent });
        Ok(())
    }

    async fn finish_completed(&self, id: DownloadId, file_path: &Path) -> Result<()> {
        let path = file_path.to_string_lossy();
        self.store().mark_completed(id, &path).await?;
        self.log_store()
            .append(
                &NewLogEntry::new(id, LogEventType::Completed, "download completed")
                    .with_metadata(json!({ "file_path": path })),
            )
            .await?;

        tracing::info!(download_id = id.0, file_path = %path, "Download completed");
        self.emit_event(Event::Completed {
            id,
            file_path: file_path.to_path_buf(),
        });
        Ok(())
    }

    async fn finish_failed(
        &self,
        id: DownloadId,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        self.store().mark_failed(id, message).await?;
        self.log_store()
            .append(&NewLogEntry::new(id, LogEventType::Error, message).with_metadata(metadata))
            .await?;

        tracing::warn!(download_id = id.0, error = %message, "Download failed");
        self.emit_event(Event::Failed {
            id,
            error: message.to_string(),
        });
        Ok(())
    }

    async fn finish_cancelled(&self, id: DownloadId) -> Result<()> {
        self.store().mark_cancelled(id, CANCELLED_MESSAGE).await?;
        self.log_store()
            .append(&NewLogEntry::new(
                id,
                LogEventType::Cancelled,
                "extractor stopped by cancellation request",
            ))
            .await?;

        tracing::info!(download_id = id.0, "Download cancelled");
        self.emit_event(Event::Cancelled { id });
        Ok(())
    }

    /// Shutdown interrupted the job: release the claim so the next start picks it up
    async fn finish_interrupted(&self, id: DownloadId) -> Result<()> {
        if !self.store().requeue(id).await? {
            return Err(lost_claim(id));
        }
        self.log_store()
            .append(&NewLogEntry::new(
                id,
                LogEventType::Warning,
                "interrupted by shutdown; returned to queue",
            ))
            .await?;

        tracing::info!(download_id = id.0, "Download interrupted by shutdown and re-queued");
        self.emit_event(Event::Requeued { id });
        Ok(())
    }
}

fn lost_claim(id: DownloadId) -> Error {
    Error::Download(DownloadError::InvalidState {
        id: id.0,
        operation: "continue".to_string(),
        current_state: "no longer claimed".to_string(),
    })
}
