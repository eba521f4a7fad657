//! Startup recovery and graceful shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::db::NewLogEntry;
use crate::error::{Error, Result};
use crate::types::{DownloadId, Event, LogEventType};

use super::MediaDownloader;

/// How often `stop()` re-checks the active map while waiting
const ACTIVE_POLL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Start the worker loop, the log pruning task and the claim recovery task
    ///
    /// Before the first claim, `downloading` records whose heartbeat expired are
    /// returned to pending; they belong to a process that died without `stop()`. Claims
    /// whose heartbeat is still fresh are picked up by the recovery task once it expires.
    ///
    /// # Errors
    ///
    /// - [`Error::Other`] if the engine was already started
    /// - [`Error::ShuttingDown`] once `stop()` has been called
    /// - Store failures from the recovery sweep
    pub async fn start(&self) -> Result<()> {
        if self.background.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        if self.background.started.swap(true, Ordering::SeqCst) {
            return Err(Error::Other("downloader already started".to_string()));
        }

        if self.db.was_unclean_shutdown().await? {
            tracing::warn!("Previous run did not shut down cleanly; recovering stale claims");
        }
        self.db.set_clean_start().await?;

        let recovered = self.recover_stale_claims().await?;
        if !recovered.is_empty() {
            tracing::info!(count = recovered.len(), "Re-queued orphaned downloads");
        }

        let mut tasks = self.background.tasks.lock().await;
        tasks.push(self.start_queue_processor());
        tasks.push(self.start_maintenance_task());
        tasks.push(self.start_claim_recovery_task());

        tracing::info!("MediaDownloader started");
        Ok(())
    }

    /// Gracefully stop the engine
    ///
    /// This method performs the shutdown sequence:
    /// 1. Refuses new enqueues and retries
    /// 2. Cancels the engine token, which stops the worker loop and kills every
    ///    running extractor; each interrupted job returns itself to pending
    /// 3. Waits up to `shutdown_grace_period` for those jobs to finish
    /// 4. Force-stops jobs still running after the grace period and re-queues them
    /// 5. Marks the shutdown as clean, emits [`Event::Shutdown`] and closes the
    ///    database pool
    ///
    /// Calling `stop()` again is a no-op. Store reads through this engine fail once
    /// it has stopped.
    pub async fn stop(&self) -> Result<()> {
        if self.background.shutdown.is_cancelled() {
            return Ok(());
        }
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.background.shutdown.cancel();

        let tasks: Vec<_> = self.background.tasks.lock().await.drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        let grace = self.config.download.shutdown_grace_period;
        match tokio::time::timeout(grace, self.wait_for_active_downloads()).await {
            Ok(()) => tracing::info!("All active downloads stopped"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Timeout waiting for downloads to stop, forcing termination"
                );
                self.force_stop_remaining().await;
            }
        }

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        }

        self.emit_event(Event::Shutdown);
        self.db.pool().close().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.queue_state.active_downloads.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active downloads to stop");
            tokio::time::sleep(ACTIVE_POLL).await;
        }
    }

    /// Abort job tasks that outlived the grace period and put their jobs back in the queue
    ///
    /// Dropping an aborted task kills its extractor process.
    async fn force_stop_remaining(&self) {
        let remaining: Vec<DownloadId> = {
            let mut active = self.queue_state.active_downloads.lock().await;
            active
                .drain()
                .map(|(id, job)| {
                    if let Some(abort) = job.abort {
                        abort.abort();
                    }
                    id
                })
                .collect()
        };

        for id in remaining {
            if let Err(e) = self.requeue_forced(id).await {
                tracing::error!(
                    download_id = id.0,
                    error = %e,
                    "Failed to re-queue force-stopped download; stale-claim recovery will pick it up"
                );
            }
        }
    }

    async fn requeue_forced(&self, id: DownloadId) -> Result<()> {
        if !self.store().requeue(id).await? {
            return Ok(());
        }
        self.log_store()
            .append(&NewLogEntry::new(
                id,
                LogEventType::Warning,
                "force-stopped at shutdown; returned to queue",
            ))
            .await?;
        self.emit_event(Event::Requeued { id });
        tracing::warn!(download_id = id.0, "Force-stopped download re-queued");
        Ok(())
    }
}
