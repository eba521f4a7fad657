//! Download record operations: creation, claiming, state transitions, queries.
//!
//! Transitions out of `downloading` are guarded by the current status in the `WHERE`
//! clause, so `started_at`, `finished_at` and `file_path` are each written at most once
//! no matter how many callers race on the same id.

use crate::error::{DatabaseError, DownloadError};
use crate::types::{Download, DownloadId, Status};
use crate::{Error, Result};

use super::{DOWNLOAD_COLUMNS, Database, DownloadRow, NewDownload, query_failed};

impl Database {
    /// Insert a new pending download record
    pub async fn insert_download(&self, download: &NewDownload) -> Result<Download> {
        let now = chrono::Utc::now().timestamp();

        let sql = format!(
            r#"
            INSERT INTO downloads (
                url, provider, target, status, progress, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 0.0, ?, ?)
            RETURNING {}
            "#,
            DOWNLOAD_COLUMNS
        );
        let row = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(&download.url)
            .bind(download.provider.as_str())
            .bind(download.target.as_str())
            .bind(Status::Pending.to_i32())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("insert download"))?;

        Ok(Download::try_from(row)?)
    }

    /// Get a download by ID
    pub async fn get_download(&self, id: DownloadId) -> Result<Option<Download>> {
        let sql = format!("SELECT {} FROM downloads WHERE id = ?", DOWNLOAD_COLUMNS);
        let row = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("get download"))?;

        row.map(Download::try_from).transpose().map_err(Error::from)
    }

    /// Atomically claim the oldest pending download
    ///
    /// The selection and the transition happen in one `UPDATE` statement. SQLite takes the
    /// write lock before evaluating the subquery, so two concurrent callers can never
    /// observe the same pending row; the `status` re-check in the outer `WHERE` keeps the
    /// statement correct even if the engine is ever moved to a database without that
    /// guarantee.
    pub async fn claim_next_pending(&self) -> Result<Option<Download>> {
        let now = chrono::Utc::now().timestamp();

        let sql = format!(
            r#"
            UPDATE downloads
            SET status = ?, progress = 0.0, started_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM downloads
                WHERE status = ?
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            )
            AND status = ?
            RETURNING {}
            "#,
            DOWNLOAD_COLUMNS
        );
        let row = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(Status::Downloading.to_i32())
            .bind(now)
            .bind(now)
            .bind(Status::Pending.to_i32())
            .bind(Status::Pending.to_i32())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("claim next pending download"))?;

        row.map(Download::try_from).transpose().map_err(Error::from)
    }

    /// Record progress for a downloading job
    ///
    /// The value is clamped to 0-100 and never lowers the stored progress. Also
    /// refreshes the job's heartbeat.
    pub async fn update_progress(&self, id: DownloadId, percent: f32) -> Result<()> {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET progress = MAX(progress, ?), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(percent)
        .bind(now)
        .bind(id)
        .bind(Status::Downloading.to_i32())
        .execute(&self.pool)
        .await
        .map_err(query_failed("update download progress"))?;

        if result.rows_affected() == 0 {
            return Err(self.guard_miss(id, "update progress of").await);
        }
        Ok(())
    }

    /// Refresh the heartbeat of a downloading job
    ///
    /// Returns false if the job is no longer downloading.
    pub async fn heartbeat(&self, id: DownloadId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query("UPDATE downloads SET updated_at = ? WHERE id = ? AND status = ?")
            .bind(now)
            .bind(id)
            .bind(Status::Downloading.to_i32())
            .execute(&self.pool)
            .await
            .map_err(query_failed("refresh download heartbeat"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a downloading job to completed
    pub async fn mark_completed(&self, id: DownloadId, file_path: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        // MAX() keeps finished_at >= started_at even if the wall clock stepped back
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, progress = 100.0, file_path = ?, error_message = NULL,
                finished_at = MAX(?, COALESCE(started_at, ?)), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(Status::Completed.to_i32())
        .bind(file_path)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(Status::Downloading.to_i32())
        .execute(&self.pool)
        .await
        .map_err(query_failed("mark download completed"))?;

        if result.rows_affected() == 0 {
            return Err(self.guard_miss(id, "complete").await);
        }
        Ok(())
    }

    /// Transition a downloading job to failed
    pub async fn mark_failed(&self, id: DownloadId, message: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, file_path = NULL, error_message = ?,
                finished_at = MAX(?, COALESCE(started_at, ?)), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(Status::Failed.to_i32())
        .bind(message)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(Status::Downloading.to_i32())
        .execute(&self.pool)
        .await
        .map_err(query_failed("mark download failed"))?;

        if result.rows_affected() == 0 {
            return Err(self.guard_miss(id, "fail").await);
        }
        Ok(())
    }

    /// Transition a pending or downloading job to cancelled
    pub async fn mark_cancelled(&self, id: DownloadId, message: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, error_message = ?,
                finished_at = MAX(?, COALESCE(started_at, ?)), updated_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(Status::Cancelled.to_i32())
        .bind(message)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(Status::Pending.to_i32())
        .bind(Status::Downloading.to_i32())
        .execute(&self.pool)
        .await
        .map_err(query_failed("mark download cancelled"))?;

        if result.rows_affected() == 0 {
            return Err(self.guard_miss(id, "cancel").await);
        }
        Ok(())
    }

    /// Return a downloading job to pending, releasing its claim
    ///
    /// Returns false if the job was not downloading.
    pub async fn requeue(&self, id: DownloadId) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = ?, progress = 0.0, started_at = NULL, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(Status::Pending.to_i32())
        .bind(now)
        .bind(id)
        .bind(Status::Downloading.to_i32())
        .execute(&self.pool)
        .await
        .map_err(query_failed("requeue download"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Return every downloading job whose heartbeat is older than `older_than_secs`
    /// to pending, returning the affected IDs
    pub async fn requeue_stale(&self, older_than_secs: i64) -> Result<Vec<DownloadId>> {
        let now = chrono::Utc::now().timestamp();
        let cutoff = now - older_than_secs;

        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            UPDATE downloads
            SET status = ?, progress = 0.0, started_at = NULL, updated_at = ?
            WHERE status = ? AND updated_at < ?
            RETURNING id
            "#,
        )
        .bind(Status::Pending.to_i32())
        .bind(now)
        .bind(Status::Downloading.to_i32())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("requeue stale downloads"))?;

        Ok(ids.into_iter().map(DownloadId).collect())
    }

    /// List downloads with a given status, newest first
    pub async fn find_by_status(
        &self,
        status: Status,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Download>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM downloads
            WHERE status = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(status.to_i32())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("list downloads by status"))?;

        into_downloads(rows)
    }

    /// List all downloads, newest first
    pub async fn find_all(&self, limit: i64, offset: i64) -> Result<Vec<Download>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM downloads
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            DOWNLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, DownloadRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("list downloads"))?;

        into_downloads(rows)
    }

    /// Count downloads with a given status
    pub async fn count_by_status(&self, status: Status) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM downloads WHERE status = ?")
            .bind(status.to_i32())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("count downloads by status"))
    }

    /// Count all downloads
    pub async fn count_all(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM downloads")
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("count downloads"))
    }

    /// Build the error for a guarded transition that matched no row
    async fn guard_miss(&self, id: DownloadId, operation: &str) -> Error {
        match self.get_download(id).await {
            Ok(Some(download)) => Error::Download(DownloadError::InvalidState {
                id: id.0,
                operation: operation.to_string(),
                current_state: download.status.to_string(),
            }),
            Ok(None) => Error::Download(DownloadError::NotFound { id: id.0 }),
            Err(e) => e,
        }
    }
}

fn into_downloads(rows: Vec<DownloadRow>) -> Result<Vec<Download>> {
    rows.into_iter()
        .map(|row| Download::try_from(row).map_err(|e: DatabaseError| Error::Database(e)))
        .collect()
}
