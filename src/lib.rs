//! # media-dl
//!
//! Durable download job engine for personal audio acquisition.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Durable** - Every job and every transition is persisted to SQLite as it happens
//! - **Bounded** - At most `max_concurrent_downloads` extractor processes run at once
//! - **Library-first** - No HTTP layer or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! The actual fetching and transcoding is done by an external yt-dlp compatible
//! extractor; the engine decides what to run, supervises it and records the result.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, DownloadOptions, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.download_dir = "/music".into();
//!
//!     let downloader = MediaDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader.start().await?;
//!     downloader
//!         .enqueue(
//!             "https://artist.bandcamp.com/album/first-light",
//!             DownloadOptions::default(),
//!         )
//!         .await?;
//!
//!     media_dl::run_with_shutdown(downloader).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Extractor argument construction
pub mod command;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Download job engine (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// External extractor invocation and output parsing
pub mod extractor;
/// Storage traits the engine works through
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, PersistenceConfig, ToolsConfig};
pub use db::Database;
pub use downloader::{MaintenanceReport, MediaDownloader};
pub use error::{DatabaseError, DownloadError, Error, Result};
pub use extractor::{CliExtractor, ExtractorRunner, RunEvent, RunOutcome, RunRequest};
pub use store::{DownloadLogStore, DownloadStore};
pub use types::{
    Download, DownloadId, DownloadLogEntry, DownloadOptions, Event, LogEventType, Page,
    Provider, QueueStats, Status, TargetKind,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `stop()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     downloader.start().await?;
///
///     // Run until SIGTERM/SIGINT, then stop gracefully
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.stop().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
