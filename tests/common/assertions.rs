//! Custom test assertions for end-to-end tests

use std::time::Duration;
use media_dl::{DownloadId, Event, MediaDownloader, Status};
use tokio::sync::broadcast;

/// Result of waiting for a download to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Download completed successfully
    Completed,
    /// Download failed with error
    Failed(String),
    /// Download was cancelled
    Cancelled,
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a download to reach a terminal status
///
/// `events` must be subscribed before the download is enqueued, or the terminal event
/// may be missed.
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<Event>,
    id: DownloadId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, .. }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::Failed {
                    id: event_id,
                    error,
                }) if event_id == id => {
                    return WaitResult::Failed(error);
                }
                Ok(Event::Cancelled { id: event_id }) if event_id == id => {
                    return WaitResult::Cancelled;
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return WaitResult::ChannelClosed;
                }
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Poll until the download reaches `status`, panicking after `timeout`
pub async fn wait_for_status(
    downloader: &MediaDownloader,
    id: DownloadId,
    status: Status,
    timeout: Duration,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let current = downloader.get(id).await.expect("get download").status;
        if current == status {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "download {} stuck in {} while waiting for {}",
                id, current, status
            );
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
