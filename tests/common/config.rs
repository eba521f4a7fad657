//! Test configuration helpers for creating downloaders around a fake extractor

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use media_dl::{Config, MediaDownloader};

use super::fixtures::write_script;

/// Configuration rooted in `root`, pointing at `extractor`
pub fn test_config(root: &Path, extractor: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("music");
    config.download.max_concurrent_downloads = 2;
    config.download.poll_interval = Duration::from_millis(200);
    config.download.shutdown_grace_period = Duration::from_secs(5);
    config.tools.extractor_path = Some(extractor.to_path_buf());
    config.tools.search_path = false;
    config.persistence.database_path = root.join("media-dl.db");
    config
}

/// Create a downloader whose extractor is the given script
///
/// `adjust` can tweak the configuration before the engine is built. Returns the
/// downloader and the tempdir (which must be kept alive).
pub async fn create_script_downloader(
    script: &str,
    adjust: impl FnOnce(&mut Config),
) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let extractor = write_script(temp_dir.path(), "fake-yt-dlp", script);

    let mut config = test_config(temp_dir.path(), &extractor);
    adjust(&mut config);

    let downloader = MediaDownloader::new(config)
        .await
        .expect("create downloader");
    (downloader, temp_dir)
}
