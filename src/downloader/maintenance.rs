//! Periodic upkeep: log retention and recovery of orphaned claims.

use std::time::Duration;

use crate::db::NewLogEntry;
use crate::error::Result;
use crate::types::{DownloadId, Event, LogEventType};

use super::MediaDownloader;

/// Floor for the heartbeat and claim-recovery period
const MIN_CLAIM_PERIOD: Duration = Duration::from_secs(1);

/// How often running jobs heartbeat and orphaned claims are looked for
///
/// A third of `stale_claim_after`, so a live job heartbeats several times inside the
/// window and an orphan is requeued at most a third of the window after it expires.
pub(crate) fn claim_period(stale_claim_after: Duration) -> Duration {
    (stale_claim_after / 3).max(MIN_CLAIM_PERIOD)
}

/// What one maintenance sweep did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Log entries removed by the retention policy
    pub logs_pruned: u64,
    /// Downloading jobs with an expired heartbeat that went back to pending
    pub requeued: Vec<DownloadId>,
}

impl MediaDownloader {
    /// Run one maintenance sweep now
    ///
    /// Deletes log entries older than `log_retention_days` and returns jobs whose
    /// claim heartbeat is older than `stale_claim_after` to the queue. Once
    /// [`start`](Self::start) has run, background tasks repeat the first step every
    /// `prune_interval` and the second every third of `stale_claim_after`.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let logs_pruned = self.prune_logs().await?;
        let requeued = self.recover_stale_claims().await?;

        Ok(MaintenanceReport {
            logs_pruned,
            requeued,
        })
    }

    /// Delete log entries past `log_retention_days`
    async fn prune_logs(&self) -> Result<u64> {
        let retention_days = self.config.persistence.log_retention_days;
        let logs_pruned = self.log_store().delete_old_logs(retention_days).await?;
        if logs_pruned > 0 {
            tracing::info!(logs_pruned, retention_days, "Pruned old download logs");
        }
        Ok(logs_pruned)
    }

    /// Return orphaned downloading jobs to pending
    ///
    /// A job is orphaned when its heartbeat stopped, which happens when the process that
    /// held the claim died. Jobs claimed by this engine heartbeat well inside the window.
    pub(crate) async fn recover_stale_claims(&self) -> Result<Vec<DownloadId>> {
        let older_than = self.config.persistence.stale_claim_after.as_secs() as i64;
        let requeued = self.store().requeue_stale(older_than).await?;

        for id in &requeued {
            self.log_store()
                .append(&NewLogEntry::new(
                    *id,
                    LogEventType::Warning,
                    "claim expired without heartbeat; returned to queue",
                ))
                .await?;
            self.emit_event(Event::Requeued { id: *id });
            tracing::warn!(download_id = id.0, "Recovered stale download claim");
        }

        if !requeued.is_empty() {
            self.queue_state.wake.notify_one();
        }
        Ok(requeued)
    }

    /// Spawn the periodic log pruning task
    ///
    /// The first sweep runs one `prune_interval` after start.
    pub(crate) fn start_maintenance_task(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.background.shutdown.clone();
        let period = self.config.persistence.prune_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = downloader.prune_logs().await {
                            tracing::error!(error = %e, "Log pruning failed");
                        }
                    }
                }
            }
            tracing::debug!("Maintenance task stopped");
        })
    }

    /// Spawn the claim recovery task
    ///
    /// Sweeps for orphaned claims every [`claim_period`], independent of log pruning, so
    /// a job orphaned shortly before a restart is picked up soon after its heartbeat
    /// expires rather than at the next prune.
    pub(crate) fn start_claim_recovery_task(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.background.shutdown.clone();
        let period = claim_period(self.config.persistence.stale_claim_after);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = downloader.recover_stale_claims().await {
                            tracing::error!(error = %e, "Stale claim sweep failed");
                        }
                    }
                }
            }
            tracing::debug!("Claim recovery task stopped");
        })
    }
}
