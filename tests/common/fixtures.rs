//! Shell scripts standing in for the extractor binary
//!
//! Each script receives the real argument list, runs in the output root and talks the
//! same line protocol as yt-dlp: `[download]` progress lines, `WARNING:`/`ERROR:` on
//! stderr and a `[filepath]` marker once the file is in place.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes a track below the working directory and reports it
pub const SUCCESS_SCRIPT: &str = r#"#!/bin/sh
echo "[bandcamp] first-light: Downloading webpage"
echo "[download] Destination: Test Artist/Test Album/01 - Opening.webm"
echo "[download]   0.0% of 4.20MiB at  1.00MiB/s ETA 00:04"
echo "WARNING: [bandcamp] unable to extract release date" >&2
echo "[download]  25.0% of 4.20MiB at  1.00MiB/s ETA 00:03"
printf '[download]  50.0%% of 4.20MiB at  1.00MiB/s ETA 00:02\r[download]  75.0%% of 4.20MiB at  1.00MiB/s ETA 00:01\n'
echo "[download] 100% of 4.20MiB in 00:00:04 at 1.00MiB/s"
mkdir -p "Test Artist/Test Album"
printf 'audio' > "Test Artist/Test Album/01 - Opening.opus"
echo "[ExtractAudio] Destination: Test Artist/Test Album/01 - Opening.opus"
echo "[filepath] $PWD/Test Artist/Test Album/01 - Opening.opus"
exit 0
"#;

/// Fails the way the extractor does for a missing page
pub const NOT_FOUND_SCRIPT: &str = r#"#!/bin/sh
echo "[generic] Extracting URL"
echo "ERROR: [generic] Unable to download webpage: HTTP Error 404: Not Found" >&2
echo "ERROR: 404 Not Found" >&2
exit 1
"#;

/// Reports a little progress, then hangs until killed
pub const HANGING_SCRIPT: &str = r#"#!/bin/sh
echo "[download]   5.0% of 80.00MiB at 100.00KiB/s ETA 13:30"
exec sleep 30
"#;

/// Records its arguments, one per line, next to the output
pub const ARGS_RECORDING_SCRIPT: &str = r#"#!/bin/sh
for arg in "$@"; do
    printf '%s\n' "$arg" >> args.txt
done
printf 'audio' > recorded.m4a
echo "[filepath] recorded.m4a"
"#;

/// Exits cleanly without ever naming an output file
pub const SILENT_SUCCESS_SCRIPT: &str = r#"#!/bin/sh
echo "[download] 100% of 1.00MiB"
exit 0
"#;

/// Write an executable script into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    let mut permissions = std::fs::metadata(&path).expect("stat script").permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("chmod script");
    path
}
