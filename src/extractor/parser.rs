//! Parser for extractor output
//!
//! Output is parsed line by line while the process runs. [`OutputCollector`] keeps just
//! enough of what it sees to turn the exit status into a [`RunOutcome`] afterwards.

use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::traits::{OutputStream, ProgressUpdate, RunOutcome};
use crate::command::FILEPATH_MARKER;

/// Number of `ERROR:` lines kept for the failure message
const MAX_ERROR_LINES: usize = 3;

// Patterns are constants; a failure to compile is a programming error
#[allow(clippy::expect_used)]
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid progress regex")
});

#[allow(clippy::expect_used)]
static ETA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bETA\s+(\S+)").expect("valid eta regex")
});

#[allow(clippy::expect_used)]
static SPEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat\s+(\S+)").expect("valid speed regex")
});

#[allow(clippy::expect_used)]
static DESTINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\w+\] (?:Destination: (.+)|(.+) has already been downloaded)$")
        .expect("valid destination regex")
});

/// Parse a `[download]  42.0% of 3.50MiB at 1.20MiB/s ETA 00:02` style line
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    let caps = PROGRESS_RE.captures(line.trim_end())?;
    let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
    let eta = ETA_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let speed = SPEED_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some(ProgressUpdate {
        percent,
        line: line.to_string(),
        eta,
        speed,
    })
}

/// Path printed after the final move, if `line` is the marker line
pub fn parse_filepath_marker(line: &str) -> Option<&str> {
    let path = line.strip_prefix(FILEPATH_MARKER)?.trim();
    // The extractor prints "NA" for unresolved template fields
    (!path.is_empty() && path != "NA").then_some(path)
}

/// Output path announced by a `Destination:` or "has already been downloaded" line
pub fn parse_destination(line: &str) -> Option<&str> {
    let caps = DESTINATION_RE.captures(line.trim_end())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim())
        .filter(|p| !p.is_empty())
}

/// Whether the line is an extractor error
pub fn is_error_line(line: &str) -> bool {
    line.starts_with("ERROR:")
}

/// Whether the line is an extractor warning
pub fn is_warning_line(line: &str) -> bool {
    line.starts_with("WARNING:")
}

/// Accumulates what is needed to classify a finished run
#[derive(Debug, Default)]
pub struct OutputCollector {
    marker_path: Option<String>,
    destination: Option<String>,
    errors: VecDeque<String>,
    last_stderr: Option<String>,
}

impl OutputCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one non-progress output line
    pub fn observe(&mut self, stream: OutputStream, line: &str) {
        if let Some(path) = parse_filepath_marker(line) {
            self.marker_path = Some(path.to_string());
            return;
        }
        if let Some(path) = parse_destination(line) {
            self.destination = Some(path.to_string());
        }
        if is_error_line(line) {
            if self.errors.len() == MAX_ERROR_LINES {
                self.errors.pop_front();
            }
            self.errors.push_back(line.trim_end().to_string());
        }
        if stream == OutputStream::Stderr && !line.trim().is_empty() {
            self.last_stderr = Some(line.trim_end().to_string());
        }
    }

    /// Output file, resolved against `working_dir` when relative
    ///
    /// The after-move marker wins; the last `Destination:` line is the fallback.
    pub fn file_path(&self, working_dir: &Path) -> Option<PathBuf> {
        let raw = self.marker_path.as_ref().or(self.destination.as_ref())?;
        let path = PathBuf::from(raw);
        Some(if path.is_absolute() {
            path
        } else {
            working_dir.join(path)
        })
    }

    /// Failure message for a run that exited with `exit_code`
    pub fn failure_message(&self, exit_code: Option<i32>) -> String {
        if !self.errors.is_empty() {
            return self.errors.iter().cloned().collect::<Vec<_>>().join("\n");
        }
        if let Some(line) = &self.last_stderr {
            return line.clone();
        }
        match exit_code {
            Some(code) => format!("extractor exited with code {}", code),
            None => "extractor was terminated by a signal".to_string(),
        }
    }

    /// Classify a process that exited on its own
    pub fn into_outcome(self, success: bool, exit_code: Option<i32>, working_dir: &Path) -> RunOutcome {
        if success {
            match self.file_path(working_dir) {
                Some(file_path) => RunOutcome::Completed { file_path },
                None => RunOutcome::Failed {
                    message: "extractor exited successfully but reported no output file"
                        .to_string(),
                    exit_code,
                },
            }
        } else {
            RunOutcome::Failed {
                message: self.failure_message(exit_code),
                exit_code,
            }
        }
    }
}
