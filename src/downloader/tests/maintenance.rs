use crate::downloader::MaintenanceReport;
use crate::downloader::test_helpers::{FakeRunner, create_test_downloader};
use crate::types::{DownloadId, DownloadOptions, Event, LogEventType, Status};
use std::sync::Arc;

const TRACK: &str = "https://artist.bandcamp.com/track/opening";

async fn age(downloader: &crate::downloader::MediaDownloader, sql: &str, id: DownloadId) {
    sqlx::query(sql)
        .bind(id)
        .execute(downloader.db.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn sweep_with_nothing_to_do_reports_nothing() {
    let (downloader, _temp) = create_test_downloader(Arc::new(FakeRunner::until_cancelled())).await;
    downloader
        .enqueue(TRACK, DownloadOptions::default())
        .await
        .unwrap();

    let report = downloader.run_maintenance().await.unwrap();
    assert_eq!(report, MaintenanceReport::default());
}

#[tokio::test]
async fn logs_past_retention_are_pruned() {
    let (downloader, _temp) = create_test_downloader(Arc::new(FakeRunner::until_cancelled())).await;
    let old = downloader
        .enqueue(TRACK, DownloadOptions::default())
        .await
        .unwrap();
    let fresh = downloader
        .enqueue(
            "https://artist.bandcamp.com/track/closing",
            DownloadOptions::default(),
        )
        .await
        .unwrap();

    // Default retention is 30 days
    age(
        &downloader,
        "UPDATE download_logs SET created_at = created_at - 31 * 86400 WHERE download_id = ?",
        old.id,
    )
    .await;

    let report = downloader.run_maintenance().await.unwrap();
    assert_eq!(report.logs_pruned, 1);
    assert!(report.requeued.is_empty());

    assert_eq!(downloader.logs(old.id, 0, 10).await.unwrap().total, 0);
    assert_eq!(downloader.logs(fresh.id, 0, 10).await.unwrap().total, 1);
    // Records themselves are never pruned
    assert_eq!(downloader.get(old.id).await.unwrap().status, Status::Pending);
}

#[tokio::test]
async fn stale_claims_are_requeued_and_fresh_ones_kept() {
    let (downloader, _temp) = create_test_downloader(Arc::new(FakeRunner::until_cancelled())).await;
    for i in 0..2 {
        downloader
            .enqueue(
                &format!("https://artist.bandcamp.com/track/song-{}", i),
                DownloadOptions::default(),
            )
            .await
            .unwrap();
    }

    // Claimed by some other process; only the first stopped heartbeating
    let stale = downloader.db.claim_next_pending().await.unwrap().unwrap();
    let fresh = downloader.db.claim_next_pending().await.unwrap().unwrap();
    age(
        &downloader,
        "UPDATE downloads SET updated_at = updated_at - 3600 WHERE id = ?",
        stale.id,
    )
    .await;

    let mut events = downloader.subscribe();
    let report = downloader.run_maintenance().await.unwrap();
    assert_eq!(report.requeued, vec![stale.id]);

    let record = downloader.get(stale.id).await.unwrap();
    assert_eq!(record.status, Status::Pending);
    assert!(record.started_at.is_none());
    assert_eq!(
        downloader.get(fresh.id).await.unwrap().status,
        Status::Downloading
    );

    let logs = downloader.logs(stale.id, 0, 10).await.unwrap();
    assert_eq!(logs.items[0].event_type, LogEventType::Warning);

    assert!(matches!(
        events.recv().await.unwrap(),
        Event::Requeued { id } if id == stale.id
    ));
}
