//! Queue processor: claims pending jobs and spawns one task per job.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use super::job::ClaimedJob;
use super::{ActiveJob, MediaDownloader};

/// Back-off after the store failed to hand out a claim
const CLAIM_ERROR_BACKOFF: Duration = Duration::from_secs(1);

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// This method spawns a background task that continuously:
    /// 1. Acquires a permit from the concurrency limiter (respects max_concurrent_downloads)
    /// 2. Atomically claims the oldest pending job from the store
    /// 3. Spawns a job task holding that permit until the job is over
    /// 4. Sleeps until an enqueue wakes it or `poll_interval` passes when nothing is pending
    ///
    /// The loop exits when the engine shutdown token fires. Individual job failures never
    /// end it.
    pub(crate) fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.background.shutdown.clone();
        let concurrent_limit = self.queue_state.concurrent_limit.clone();
        let wake = self.queue_state.wake.clone();
        let poll_interval = self.config.download.poll_interval;

        tokio::spawn(async move {
            tracing::info!("Queue processor started");
            loop {
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = concurrent_limit.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        // Semaphore closed
                        Err(_) => break,
                    },
                };

                match downloader.claim_and_register().await {
                    Ok(Some(job)) => {
                        let id = job.download.id;
                        let job_downloader = downloader.clone();
                        let handle = tokio::spawn(async move {
                            let _permit = permit;
                            job_downloader.run_job(job).await;
                        });

                        // The job may already be gone, in which case there is nothing to abort
                        let mut active = downloader.queue_state.active_downloads.lock().await;
                        if let Some(job) = active.get_mut(&id) {
                            job.abort = Some(handle.abort_handle());
                        }
                    }
                    Ok(None) => {
                        drop(permit);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = wake.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(e) => {
                        drop(permit);
                        tracing::error!(error = %e, "Failed to claim next pending download");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(CLAIM_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
            tracing::info!("Queue processor stopped");
        })
    }

    /// Claim the next pending job and register it as active
    ///
    /// The active map lock is held across the claim so `cancel()` never observes a job
    /// that is claimed but not yet cancellable.
    async fn claim_and_register(&self) -> crate::Result<Option<ClaimedJob>> {
        let mut active = self.queue_state.active_downloads.lock().await;

        if self.background.shutdown.is_cancelled() {
            return Ok(None);
        }

        let Some(download) = self.store().claim_next_pending().await? else {
            return Ok(None);
        };

        let token = self.background.shutdown.child_token();
        let user_cancelled = Arc::new(AtomicBool::new(false));
        active.insert(
            download.id,
            ActiveJob {
                token: token.clone(),
                user_cancelled: user_cancelled.clone(),
                abort: None,
            },
        );

        tracing::info!(
            download_id = download.id.0,
            url = %download.url,
            "Claimed download"
        );

        Ok(Some(ClaimedJob {
            download,
            token,
            user_cancelled,
        }))
    }
}
