//! Single-job control: cancel and retry.

use serde_json::json;
use std::sync::atomic::Ordering;

use crate::db::{NewDownload, NewLogEntry};
use crate::error::{DownloadError, Error, Result};
use crate::types::{Download, DownloadId, Event, LogEventType, Status};

use super::MediaDownloader;

/// Message stored on records cancelled by request
pub(crate) const CANCELLED_MESSAGE: &str = "cancelled by request";

impl MediaDownloader {
    /// Cancel a pending or downloading job
    ///
    /// A pending job is cancelled in the store immediately. A downloading job has its
    /// extractor killed; the job then records itself as cancelled.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NotFound`] if the job does not exist
    /// - [`DownloadError::InvalidState`] if the job already reached a terminal status
    pub async fn cancel(&self, id: DownloadId) -> Result<()> {
        // Held across the store update so the worker loop cannot claim and register the
        // job in between
        let active = self.queue_state.active_downloads.lock().await;

        if let Some(job) = active.get(&id) {
            job.user_cancelled.store(true, Ordering::SeqCst);
            job.token.cancel();
            tracing::info!(download_id = id.0, "Cancellation requested for running download");
            return Ok(());
        }

        self.store().mark_cancelled(id, CANCELLED_MESSAGE).await?;
        drop(active);

        self.log_store()
            .append(&NewLogEntry::new(
                id,
                LogEventType::Cancelled,
                "cancelled before start",
            ))
            .await?;
        self.emit_event(Event::Cancelled { id });
        tracing::info!(download_id = id.0, "Download cancelled");

        Ok(())
    }

    /// Queue a new attempt of a failed or cancelled job
    ///
    /// The original record is left untouched; the new job gets a `queued` log entry
    /// pointing back to it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the job does not exist
    /// - [`DownloadError::InvalidState`] unless the job is failed or cancelled
    /// - [`Error::ShuttingDown`] once `stop()` has begun
    pub async fn retry(&self, id: DownloadId) -> Result<Download> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let original = self.get(id).await?;
        if !matches!(original.status, Status::Failed | Status::Cancelled) {
            return Err(Error::Download(DownloadError::InvalidState {
                id: id.0,
                operation: "retry".to_string(),
                current_state: original.status.to_string(),
            }));
        }

        let new = NewDownload {
            url: original.url,
            provider: original.provider,
            target: original.target,
        };
        let download = self
            .insert_queued(
                new,
                &format!("retry of download {}", id),
                json!({ "retry_of": id.0 }),
            )
            .await?;

        tracing::info!(
            download_id = download.id.0,
            retry_of = id.0,
            "Download re-queued as new job"
        );

        Ok(download)
    }
}
