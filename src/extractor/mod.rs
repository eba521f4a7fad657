//! External extractor invocation
//!
//! The engine never downloads or transcodes anything itself. Each job hands an argument
//! list to an [`ExtractorRunner`], which runs the external tool and reports what
//! happened.
//!
//! - [`CliExtractor`]: spawns a yt-dlp compatible binary
//! - [`parser`]: turns raw output lines into progress updates and outcomes
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::extractor::{CliExtractor, ExtractorRunner, RunEvent, RunRequest};
//! use media_dl::types::DownloadId;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = CliExtractor::from_path().expect("yt-dlp not found");
//!     let (tx, mut rx) = mpsc::channel(64);
//!
//!     let request = RunRequest {
//!         download_id: DownloadId(1),
//!         args: vec!["--".into(), "https://artist.bandcamp.com/track/song".into()],
//!         working_dir: "/music".into(),
//!     };
//!     let run = tokio::spawn(async move { runner.run(request, tx, CancellationToken::new()).await });
//!
//!     while let Some(event) = rx.recv().await {
//!         if let RunEvent::Progress(update) = event {
//!             println!("{:.1}%", update.percent);
//!         }
//!     }
//!     println!("{:?}", run.await??);
//!     Ok(())
//! }
//! ```

mod cli;
pub mod parser;
mod traits;

pub use cli::{CliExtractor, DEFAULT_BINARY};
pub use traits::{
    ExtractorRunner, OutputStream, ProgressUpdate, RunEvent, RunOutcome, RunRequest,
};
