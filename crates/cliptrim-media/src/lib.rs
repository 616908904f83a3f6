//! CLI wrappers for the two external pipeline stages.
//!
//! This crate provides:
//! - A capability interface ([`StageRunner`]) over external tools, with a
//!   subprocess implementation that streams stdout/stderr as they arrive
//! - Lenient percentage extraction from free-form tool output
//! - Argument builders for the yt-dlp fetch and the FFmpeg cut
//! - Resolution of decorated downloader output names
//! - Per-task cleanup and the age-based sweep of leftover temp files

pub mod artifacts;
pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod stage;

pub use artifacts::{
    cleanup_in_dirs, cleanup_task_artifacts, resolve_fetched_artifact, sweep_stale_artifacts, CleanupReport,
    CleanupWarning, MEDIA_EXTENSIONS, TEMP_PREFIX,
};
pub use command::{cut_command, locate_tool, FfmpegCommand};
pub use download::{fetch_command, format_selector};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use stage::{
    extract_percent, ProcessStageRunner, Stage, StageCommand, StageEvent, StageResult, StageRunner,
};
