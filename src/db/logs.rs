//! Append-only per-download log entries and retention pruning.

use crate::Result;
use crate::types::{DownloadId, DownloadLogEntry};

use super::{Database, LogRow, NewLogEntry, query_failed};

/// Seconds in one retention day
const SECS_PER_DAY: i64 = 86_400;

impl Database {
    /// Append a log entry, returning its ID
    pub async fn insert_log(&self, entry: &NewLogEntry) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO download_logs (download_id, event_type, message, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.download_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.message)
        .bind(metadata)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_failed("insert download log"))?;

        Ok(result.last_insert_rowid())
    }

    /// List log entries of one download, newest first
    pub async fn find_logs_by_download_id(
        &self,
        download_id: DownloadId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DownloadLogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT id, download_id, event_type, message, metadata, created_at
            FROM download_logs
            WHERE download_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(download_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("list download logs"))?;

        rows.into_iter()
            .map(|row| DownloadLogEntry::try_from(row).map_err(Into::into))
            .collect()
    }

    /// Count log entries of one download
    pub async fn count_logs_by_download_id(&self, download_id: DownloadId) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM download_logs WHERE download_id = ?")
            .bind(download_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed("count download logs"))
    }

    /// Delete log entries older than `days` days, returning how many were removed
    pub async fn delete_old_logs(&self, days: u32) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp() - i64::from(days) * SECS_PER_DAY;
        self.delete_logs_before(cutoff).await
    }

    /// Delete log entries created strictly before `cutoff` (Unix seconds)
    pub async fn delete_logs_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_logs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(query_failed("delete old download logs"))?;

        Ok(result.rows_affected())
    }
}
