use crate::db::*;
use tempfile::{NamedTempFile, tempdir};

#[tokio::test]
async fn test_migrations_create_schema_once() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    db.close().await;

    // Reopening must not re-run v1 against existing tables
    let db = Database::new(temp_file.path()).await.unwrap();
    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1]);

    for table in ["downloads", "download_logs", "runtime_state"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} should exist", table);
    }

    db.close().await;
}

#[tokio::test]
async fn test_new_creates_missing_parent_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("state").join("media-dl.db");

    let db = Database::new(&path).await.unwrap();
    assert!(path.exists());

    db.close().await;
}

#[tokio::test]
async fn test_logs_require_existing_download() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let result = db
        .insert_log(&NewLogEntry::new(
            crate::types::DownloadId(777),
            crate::types::LogEventType::Queued,
            "orphan",
        ))
        .await;
    assert!(result.is_err(), "foreign key should reject orphan log entries");

    db.close().await;
}
