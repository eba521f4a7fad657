//! Extractor argument construction
//!
//! [`build_args`] is a pure function of the provider and target kind. The source URL and
//! any configured extra arguments are appended by the caller, see [`invocation`].

use crate::types::{Provider, TargetKind};

/// Marker printed by the extractor once the final file is in place
///
/// The runner looks for this prefix to resolve the output path.
pub const FILEPATH_MARKER: &str = "[filepath] ";

/// Centre square crop applied to converted thumbnails
const SQUARE_CROP: &str = r#"ThumbnailsConvertor+FFmpeg_o:-c:v mjpeg -vf crop="'if(gt(ih,iw),iw,ih)':'if(gt(iw,ih),ih,iw)'""#;

/// Strips a trailing parenthetical such as "(Official)" or "(feat. X)"
const PARENTHETICAL_SUFFIX: &str = r"\s*\([^)]*\)$";

/// Strips YouTube's auto-generated " - Topic" channel suffix
const TOPIC_SUFFIX: &str = r" - Topic$";

/// Build the ordered extractor arguments for one provider and target kind
///
/// The result never contains the source URL.
pub fn build_args(provider: Provider, target: TargetKind) -> Vec<String> {
    let mut args = base_args();

    if provider == Provider::YoutubeMusic {
        push(&mut args, &["--replace-in-metadata", "uploader,artist", TOPIC_SUFFIX, ""]);
        push(&mut args, &["--parse-metadata", "playlist_index:%(track_number)s"]);
        push(
            &mut args,
            &["--parse-metadata", "%(release_year,upload_date)s:%(meta_date)s"],
        );
    }

    let templates = OutputTemplates::for_provider(provider);
    push(&mut args, &["-o", &format!("thumbnail:{}/cover.%(ext)s", templates.folder)]);
    let file = match target {
        TargetKind::Album => format!("{}/{} - %(title)s.%(ext)s", templates.folder, templates.index),
        TargetKind::Track => format!("{}/%(title)s.%(ext)s", templates.folder),
    };
    push(&mut args, &["-o", &file]);

    push(
        &mut args,
        &[match target {
            TargetKind::Album => "--yes-playlist",
            TargetKind::Track => "--no-playlist",
        }],
    );

    args
}

/// Full argument list for one run: built arguments, configured extras, then the URL
///
/// The URL is placed after `--` so it can never be read as an option.
pub fn invocation(
    provider: Provider,
    target: TargetKind,
    extra_args: &[String],
    url: &str,
) -> Vec<String> {
    let mut args = build_args(provider, target);
    args.extend(extra_args.iter().cloned());
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn base_args() -> Vec<String> {
    let mut args = Vec::with_capacity(40);
    push(
        &mut args,
        &[
            "--extract-audio",
            "--audio-format",
            "best",
            "--audio-quality",
            "0",
            "--format",
            "bestaudio/best",
            "--embed-thumbnail",
            "--embed-metadata",
            "--convert-thumbnails",
            "jpg",
            "--postprocessor-args",
            SQUARE_CROP,
            "--replace-in-metadata",
            "artist,uploader",
            PARENTHETICAL_SUFFIX,
            "",
            "--newline",
            "--progress",
            "--no-colors",
            "--print",
        ],
    );
    args.push(format!("after_move:{}%(filepath)s", FILEPATH_MARKER));
    args
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Provider-specific pieces of the output path
struct OutputTemplates {
    /// Artist/album folder, relative to the output root
    folder: &'static str,
    /// Zero-padded position inside an album
    index: &'static str,
}

impl OutputTemplates {
    fn for_provider(provider: Provider) -> Self {
        match provider {
            // Bandcamp pages without album metadata fall back to the title
            Provider::Bandcamp => Self {
                folder: "%(uploader,title)s/%(album,title)s",
                index: "%(playlist_index)02d",
            },
            Provider::YoutubeMusic => Self {
                folder: "%(uploader|Unknown)s/%(album|Unknown)s",
                index: "%(track_number,playlist_index)02d",
            },
        }
    }
}
