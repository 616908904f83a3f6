//! Progress events pushed to clients.
//!
//! One [`ProgressEvent`] is emitted per state transition or progress tick.
//! The same JSON shape is used for the SSE stream and for snapshot polling.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and validated, fetch not yet running
    #[default]
    Starting,
    /// Fetch stage running
    Downloading,
    /// Cut stage running
    Trimming,
    /// Intermediates being removed
    Cleaning,
    /// Final artifact ready
    Complete,
    /// Task failed
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Starting => "starting",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Trimming => "trimming",
            TaskStatus::Cleaning => "cleaning",
            TaskStatus::Complete => "complete",
            TaskStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    pub status: TaskStatus,
    /// Percentage (0-100)
    pub progress: u8,
    pub message: String,
    /// Name of the downloadable artifact; only set on `complete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ProgressEvent {
    /// Create a non-terminal progress event.
    pub fn new(status: TaskStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.min(100),
            message: message.into(),
            filename: None,
        }
    }

    /// Create the terminal success event.
    pub fn complete(filename: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Complete,
            progress: 100,
            message: "Clip ready".to_string(),
            filename: Some(filename.into()),
        }
    }

    /// Create the terminal failure event. Failures always report 0%.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            progress: 0,
            message: message.into(),
            filename: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
