//! Argument builder for the yt-dlp fetch stage.

use std::path::Path;

use cliptrim_models::OutputFormat;

use crate::stage::{Stage, StageCommand};

/// yt-dlp format selector for a clip.
///
/// Video prefers MP4/M4A streams that merge without re-encoding and never
/// exceeds `quality` lines. Audio only needs the best audio stream.
pub fn format_selector(format: OutputFormat, quality: Option<u32>) -> String {
    match (format, quality) {
        (OutputFormat::Audio, _) => "bestaudio[ext=m4a]/bestaudio/best".to_string(),
        (OutputFormat::Video, Some(q)) => format!(
            "bestvideo[height<={q}][ext=mp4]+bestaudio[ext=m4a]/\
             bestvideo[height<={q}]+bestaudio/\
             best[height<={q}]/best",
        ),
        (OutputFormat::Video, None) => {
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best".to_string()
        }
    }
}

/// Build the fetch stage.
///
/// `--newline` makes yt-dlp print each progress update on its own line.
/// The URL goes after `--` so it can never be read as an option.
pub fn fetch_command(
    program: &str,
    url: &str,
    output: &Path,
    format: OutputFormat,
    quality: Option<u32>,
) -> StageCommand {
    let mut cmd = StageCommand::new(Stage::Fetch, program)
        .args(["--newline", "--no-playlist", "--no-warnings"])
        // Keep the local mtime so the stale-file sweep sees a fresh file
        .arg("--no-mtime")
        .arg("-f")
        .arg(format_selector(format, quality));

    if format == OutputFormat::Video {
        cmd = cmd.args(["--merge-output-format", "mp4"]);
    }

    cmd.arg("-o")
        .arg(output.to_string_lossy())
        .arg("--")
        .arg(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_fetch_args() {
        let cmd = fetch_command(
            "yt-dlp",
            "https://www.youtube.com/watch?v=abc",
            Path::new("/work/temp_x_source.mp4"),
            OutputFormat::Video,
            Some(720),
        );

        assert_eq!(cmd.stage, Stage::Fetch);
        assert_eq!(
            &cmd.args[..4],
            &["--newline", "--no-playlist", "--no-warnings", "--no-mtime"]
        );
        let args = cmd.args.join(" ");
        assert!(args.contains("height<=720"));
        assert!(args.contains("--merge-output-format mp4"));
        assert!(args.ends_with("-o /work/temp_x_source.mp4 -- https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_audio_fetch_args() {
        let cmd = fetch_command(
            "yt-dlp",
            "https://vimeo.com/1",
            Path::new("a.m4a"),
            OutputFormat::Audio,
            Some(1080),
        );
        let args = cmd.args.join(" ");
        assert!(args.contains("-f bestaudio[ext=m4a]/bestaudio/best"));
        assert!(!args.contains("--merge-output-format"));
        assert!(!args.contains("height"));
        assert!(args.contains("--no-mtime"));
    }

    #[test]
    fn test_uncapped_video_selector() {
        let selector = format_selector(OutputFormat::Video, None);
        assert!(!selector.contains("height"));
        assert!(selector.ends_with("/best"));
    }
}
