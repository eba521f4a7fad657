//! Persistence contracts consumed by the download engine
//!
//! The engine only ever talks to storage through these two traits. [`Database`] is the
//! production implementation; every mutating operation on it is a single atomic SQL
//! statement, which is what lets concurrent jobs share one store without any locking in
//! the engine itself.

use async_trait::async_trait;

use crate::Result;
use crate::db::{Database, NewDownload, NewLogEntry};
use crate::types::{Download, DownloadId, DownloadLogEntry, Status};

/// Durable download records
#[async_trait]
pub trait DownloadStore: Send + Sync {
    /// Insert a new pending record
    async fn create(&self, download: &NewDownload) -> Result<Download>;

    /// Fetch one record
    async fn get(&self, id: DownloadId) -> Result<Option<Download>>;

    /// Atomically move the oldest pending record to downloading
    ///
    /// Never returns the same id to two callers, whatever their concurrency.
    async fn claim_next_pending(&self) -> Result<Option<Download>>;

    /// Record progress; the stored value never decreases
    async fn update_progress(&self, id: DownloadId, percent: f32) -> Result<()>;

    /// Refresh the claim heartbeat, returning false if the job is no longer downloading
    async fn heartbeat(&self, id: DownloadId) -> Result<bool>;

    /// Downloading → completed
    async fn mark_completed(&self, id: DownloadId, file_path: &str) -> Result<()>;

    /// Downloading → failed
    async fn mark_failed(&self, id: DownloadId, message: &str) -> Result<()>;

    /// Pending or downloading → cancelled
    async fn mark_cancelled(&self, id: DownloadId, message: &str) -> Result<()>;

    /// Downloading → pending, returning false if the job was not downloading
    async fn requeue(&self, id: DownloadId) -> Result<bool>;

    /// Re-queue downloading records whose heartbeat is older than `older_than_secs`
    async fn requeue_stale(&self, older_than_secs: i64) -> Result<Vec<DownloadId>>;

    /// One page of records with `status`, newest first
    async fn find_by_status(&self, status: Status, page: u32, page_size: u32)
    -> Result<Vec<Download>>;

    /// One page of all records, newest first
    async fn find_all(&self, page: u32, page_size: u32) -> Result<Vec<Download>>;

    /// Number of records with `status`
    async fn count_by_status(&self, status: Status) -> Result<i64>;

    /// Number of records
    async fn count_all(&self) -> Result<i64>;
}

/// Append-only per-download event log
#[async_trait]
pub trait DownloadLogStore: Send + Sync {
    /// Append an entry, returning its ID
    async fn append(&self, entry: &NewLogEntry) -> Result<i64>;

    /// One page of a download's entries, newest first
    async fn find_by_download_id(
        &self,
        download_id: DownloadId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<DownloadLogEntry>>;

    /// Number of entries of one download
    async fn count_by_download_id(&self, download_id: DownloadId) -> Result<i64>;

    /// Delete entries older than `days` days, returning how many were removed
    async fn delete_old_logs(&self, days: u32) -> Result<u64>;
}

/// Convert a zero-based page into `(limit, offset)`
fn limit_offset(page: u32, page_size: u32) -> (i64, i64) {
    let limit = i64::from(page_size);
    (limit, i64::from(page) * limit)
}

#[async_trait]
impl DownloadStore for Database {
    async fn create(&self, download: &NewDownload) -> Result<Download> {
        self.insert_download(download).await
    }

    async fn get(&self, id: DownloadId) -> Result<Option<Download>> {
        self.get_download(id).await
    }

    async fn claim_next_pending(&self) -> Result<Option<Download>> {
        Database::claim_next_pending(self).await
    }

    async fn update_progress(&self, id: DownloadId, percent: f32) -> Result<()> {
        Database::update_progress(self, id, percent).await
    }

    async fn heartbeat(&self, id: DownloadId) -> Result<bool> {
        Database::heartbeat(self, id).await
    }

    async fn mark_completed(&self, id: DownloadId, file_path: &str) -> Result<()> {
        Database::mark_completed(self, id, file_path).await
    }

    async fn mark_failed(&self, id: DownloadId, message: &str) -> Result<()> {
        Database::mark_failed(self, id, message).await
    }

    async fn mark_cancelled(&self, id: DownloadId, message: &str) -> Result<()> {
        Database::mark_cancelled(self, id, message).await
    }

    async fn requeue(&self, id: DownloadId) -> Result<bool> {
        Database::requeue(self, id).await
    }

    async fn requeue_stale(&self, older_than_secs: i64) -> Result<Vec<DownloadId>> {
        Database::requeue_stale(self, older_than_secs).await
    }

    async fn find_by_status(
        &self,
        status: Status,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Download>> {
        let (limit, offset) = limit_offset(page, page_size);
        Database::find_by_status(self, status, limit, offset).await
    }

    async fn find_all(&self, page: u32, page_size: u32) -> Result<Vec<Download>> {
        let (limit, offset) = limit_offset(page, page_size);
        Database::find_all(self, limit, offset).await
    }

    async fn count_by_status(&self, status: Status) -> Result<i64> {
        Database::count_by_status(self, status).await
    }

    async fn count_all(&self) -> Result<i64> {
        Database::count_all(self).await
    }
}

#[async_trait]
impl DownloadLogStore for Database {
    async fn append(&self, entry: &NewLogEntry) -> Result<i64> {
        self.insert_log(entry).await
    }

    async fn find_by_download_id(
        &self,
        download_id: DownloadId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<DownloadLogEntry>> {
        let (limit, offset) = limit_offset(page, page_size);
        self.find_logs_by_download_id(download_id, limit, offset)
            .await
    }

    async fn count_by_download_id(&self, download_id: DownloadId) -> Result<i64> {
        self.count_logs_by_download_id(download_id).await
    }

    async fn delete_old_logs(&self, days: u32) -> Result<u64> {
        Database::delete_old_logs(self, days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_zero_based() {
        assert_eq!(limit_offset(0, 20), (20, 0));
        assert_eq!(limit_offset(3, 20), (20, 60));
        assert_eq!(limit_offset(u32::MAX, 200), (200, i64::from(u32::MAX) * 200));
    }
}
