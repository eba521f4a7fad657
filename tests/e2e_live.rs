//! End-to-end test against a real yt-dlp install and the network
//!
//! Gated behind the `live-tests` feature and `#[ignore]`, so normal runs never touch the
//! network.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features live-tests --test e2e_live -- --ignored --nocapture
//! ```
//!
//! # Environment variables (.env file)
//!
//! - `LIVE_TRACK_URL` - A single, freely downloadable Bandcamp or YouTube Music track
//! - `YT_DLP_PATH` - Extractor binary (optional, default: found on `PATH`)

#![cfg(all(unix, feature = "live-tests"))]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{WaitResult, wait_for_terminal};
use media_dl::{Config, DownloadOptions, MediaDownloader, Status};
use std::time::Duration;

#[tokio::test]
#[ignore]
async fn live_track_downloads_and_embeds_metadata() {
    dotenvy::dotenv().ok();
    let Ok(url) = std::env::var("LIVE_TRACK_URL") else {
        eprintln!("LIVE_TRACK_URL not set, skipping");
        return;
    };

    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.download_dir = temp.path().join("music");
    config.persistence.database_path = temp.path().join("media-dl.db");
    config.tools.extractor_path = std::env::var("YT_DLP_PATH").ok().map(Into::into);

    let downloader = MediaDownloader::new(config).await.unwrap();
    let mut events = downloader.subscribe();
    downloader.start().await.unwrap();

    let download = downloader
        .enqueue(&url, DownloadOptions::default())
        .await
        .unwrap();
    let result = wait_for_terminal(&mut events, download.id, Duration::from_secs(600)).await;
    assert_eq!(result, WaitResult::Completed, "live download did not complete");

    let record = downloader.get(download.id).await.unwrap();
    assert_eq!(record.status, Status::Completed);
    let file_path = record.file_path.unwrap();
    assert!(file_path.exists(), "{} missing", file_path.display());
    assert!(file_path.starts_with(temp.path().join("music")));

    downloader.stop().await.unwrap();
}
