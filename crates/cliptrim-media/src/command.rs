//! FFmpeg command builder for the cut stage.

use std::path::{Path, PathBuf};

use cliptrim_models::OutputFormat;

use crate::error::{MediaError, MediaResult};
use crate::stage::{Stage, StageCommand};

const AUDIO_BITRATE: &str = "192k";

/// Only real errors reach the diagnostic tail.
const LOG_LEVEL: &str = "error";

/// Builder for FFmpeg argument lists.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments before -i
    input_args: Vec<String>,
    /// Arguments after -i
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Fast input seek to whole seconds.
    pub fn seek(self, seconds: u64) -> Self {
        self.input_arg("-ss").input_arg(seconds.to_string())
    }

    /// Output duration in whole seconds.
    pub fn duration(self, seconds: u64) -> Self {
        self.output_arg("-t").output_arg(seconds.to_string())
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Move the moov atom to the front so playback can start before the
    /// whole file is downloaded.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            LOG_LEVEL.to_string(),
            "-nostats".to_string(),
            // Progress key=value lines on stderr, one per tick
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }

    pub fn into_stage_command(self, program: impl Into<String>) -> StageCommand {
        StageCommand::new(Stage::Cut, program).args(self.build_args())
    }
}

/// Build the cut stage for a clip window.
///
/// Video keeps the source video stream and re-encodes audio to AAC; audio
/// drops video and encodes MP3.
pub fn cut_command(
    program: &str,
    input: &Path,
    output: &Path,
    start_secs: u64,
    duration_secs: u64,
    format: OutputFormat,
) -> StageCommand {
    let cmd = FfmpegCommand::new(input, output)
        .seek(start_secs)
        .duration(duration_secs);

    let cmd = match format {
        OutputFormat::Video => cmd
            .video_codec("copy")
            .audio_codec("aac")
            .audio_bitrate(AUDIO_BITRATE)
            .faststart(),
        OutputFormat::Audio => cmd
            .no_video()
            .audio_codec("libmp3lame")
            .audio_bitrate(AUDIO_BITRATE),
    };

    cmd.into_stage_command(program)
}

/// Resolve a configured tool name or path to an executable.
pub fn locate_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}
