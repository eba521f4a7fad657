//! Enqueueing and read operations.

use serde_json::json;
use std::sync::atomic::Ordering;

use crate::db::{NewDownload, NewLogEntry};
use crate::error::{Error, Result};
use crate::types::{
    Download, DownloadId, DownloadLogEntry, DownloadOptions, Event, LogEventType, Page,
    Provider, QueueStats, Status, TargetKind,
};

use super::MediaDownloader;

/// Largest accepted `page_size`
pub(crate) const MAX_PAGE_SIZE: u32 = 200;

impl MediaDownloader {
    /// Add a URL to the queue
    ///
    /// The provider and target kind are taken from `options` or inferred from the URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the URL does not parse, is not http(s), has no host,
    ///   or belongs to no supported provider
    /// - [`Error::ShuttingDown`] once `stop()` has begun
    pub async fn enqueue(&self, url: &str, options: DownloadOptions) -> Result<Download> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let new = validate_request(url, &options)?;
        let download = self.insert_queued(new, "queued", json!({})).await?;

        tracing::info!(
            download_id = download.id.0,
            provider = %download.provider,
            target = download.target.as_str(),
            "Download queued"
        );

        Ok(download)
    }

    /// Persist a new pending record, log it and wake the worker loop
    pub(crate) async fn insert_queued(
        &self,
        new: NewDownload,
        message: &str,
        mut metadata: serde_json::Value,
    ) -> Result<Download> {
        let download = self.store().create(&new).await?;

        if let Some(map) = metadata.as_object_mut() {
            map.insert("provider".into(), json!(download.provider.as_str()));
            map.insert("target".into(), json!(download.target.as_str()));
        }
        self.log_store()
            .append(
                &NewLogEntry::new(download.id, LogEventType::Queued, message)
                    .with_metadata(metadata),
            )
            .await?;

        self.emit_event(Event::Queued {
            id: download.id,
            url: download.url.clone(),
        });
        self.queue_state.wake.notify_one();

        Ok(download)
    }

    /// Get one download
    pub async fn get(&self, id: DownloadId) -> Result<Download> {
        self.store()
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("download {}", id)))
    }

    /// List downloads newest first, optionally filtered by status
    ///
    /// `page` is zero-based. `total` counts every matching record regardless of paging.
    pub async fn list(
        &self,
        status: Option<Status>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Download>> {
        validate_page_size(page_size)?;

        let (items, total) = match status {
            Some(status) => (
                self.store().find_by_status(status, page, page_size).await?,
                self.store().count_by_status(status).await?,
            ),
            None => (
                self.store().find_all(page, page_size).await?,
                self.store().count_all().await?,
            ),
        };

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Log entries of one download, newest first
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the download does not exist.
    pub async fn logs(
        &self,
        id: DownloadId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<DownloadLogEntry>> {
        validate_page_size(page_size)?;
        // Distinguish "no logs" from "no such download"
        self.get(id).await?;

        let items = self
            .log_store()
            .find_by_download_id(id, page, page_size)
            .await?;
        let total = self.log_store().count_by_download_id(id).await?;

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Job counts per status
    pub async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats {
            total: self.store().count_all().await?,
            ..Default::default()
        };
        for status in Status::ALL {
            let count = self.store().count_by_status(status).await?;
            match status {
                Status::Pending => stats.pending = count,
                Status::Downloading => stats.downloading = count,
                Status::Completed => stats.completed = count,
                Status::Failed => stats.failed = count,
                Status::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }
}

/// Validate an enqueue request and resolve provider and target kind
pub(crate) fn validate_request(url: &str, options: &DownloadOptions) -> Result<NewDownload> {
    let raw = url.trim();
    if raw.is_empty() {
        return Err(Error::Validation("url is required".to_string()));
    }

    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::Validation(format!("invalid url '{}': {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "unsupported url scheme '{}'",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Validation(format!("url '{}' has no host", raw)))?;

    let provider = match options.provider {
        Some(provider) => provider,
        None => Provider::from_host(host).ok_or_else(|| {
            Error::Validation(format!(
                "cannot infer provider for host '{}'; pass one explicitly",
                host
            ))
        })?,
    };
    let target = options
        .target
        .unwrap_or_else(|| TargetKind::from_url(&parsed));

    Ok(NewDownload {
        url: parsed.to_string(),
        provider,
        target,
    })
}

fn validate_page_size(page_size: u32) -> Result<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(Error::Validation(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}
