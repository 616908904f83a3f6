//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::stage::Stage;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while running pipeline stages.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The tool could not be started at all (missing binary, permissions).
    #[error("{stage} tool '{program}' could not be launched: {source}")]
    StageSpawn {
        stage: Stage,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("{stage} failed ({}): {stderr_tail}", exit_label(.exit_code))]
    StageFailed {
        stage: Stage,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Expected artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    #[error("{stage} timed out after {secs} seconds")]
    Timeout { stage: Stage, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl MediaError {
    /// Create a spawn failure error.
    pub fn stage_spawn(stage: Stage, program: impl Into<String>, source: std::io::Error) -> Self {
        Self::StageSpawn {
            stage,
            program: program.into(),
            source,
        }
    }

    /// Create a stage failure error.
    pub fn stage_failed(stage: Stage, exit_code: Option<i32>, stderr_tail: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            exit_code,
            stderr_tail: stderr_tail.into(),
        }
    }

    /// Create a missing artifact error.
    pub fn artifact_missing(path: impl Into<PathBuf>) -> Self {
        Self::ArtifactMissing(path.into())
    }
}
