//! Runtime state tracking: clean/unclean shutdown detection.

use crate::Result;

use super::{Database, query_failed};

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session never reached `set_clean_shutdown()`,
    /// which means it crashed or was killed. Jobs it left downloading are picked up by
    /// the stale-claim sweep.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = 'clean_shutdown'")
                .fetch_optional(&self.pool)
                .await
                .map_err(query_failed("check shutdown state"))?;

        // A missing row counts as unclean
        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that the engine is running
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_clean_shutdown_flag(false).await
    }

    /// Mark that the engine has shut down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_clean_shutdown_flag(true).await
    }

    async fn set_clean_shutdown_flag(&self, clean: bool) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let value = if clean { "true" } else { "false" };
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES ('clean_shutdown', ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_failed("update shutdown state"))?;

        Ok(())
    }
}
