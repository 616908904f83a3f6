//! Clip requests and task identifiers.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by every temporary file the pipeline writes. Final clip
/// names never start with it.
pub const TEMP_PREFIX: &str = "temp_";

/// Unique identifier for a clip task.
///
/// Every intermediate and final artifact name embeds it, so it must stay
/// filename-safe: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a client-supplied ID. Returns `None` unless it has the shape
    /// produced by [`TaskId::new`].
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        valid.then(|| Self(s.to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every temporary artifact of this task.
    pub fn temp_prefix(&self) -> String {
        format!("{}{}", TEMP_PREFIX, self.0)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output container requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MP4 video with AAC audio
    #[default]
    Video,
    /// MP3 audio only
    Audio,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Video => "video",
            OutputFormat::Audio => "audio",
        }
    }

    /// Extension of the final, trimmed artifact.
    pub fn final_extension(&self) -> &'static str {
        match self {
            OutputFormat::Video => "mp4",
            OutputFormat::Audio => "mp3",
        }
    }

    /// Extension the downloader is asked to produce.
    pub fn fetch_extension(&self) -> &'static str {
        match self {
            OutputFormat::Video => "mp4",
            OutputFormat::Audio => "m4a",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clip submission as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipRequest {
    /// Source video URL
    pub url: String,

    /// Clip start (`HH:MM:SS[.mmm]` or `MM:SS`)
    pub start: String,

    /// Clip end (`HH:MM:SS[.mmm]` or `MM:SS`)
    pub end: String,

    /// Desired download name (sanitized, extension ignored)
    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default)]
    pub format: OutputFormat,

    /// Upper bound on vertical resolution; ignored for audio
    #[serde(default)]
    pub quality: Option<u32>,
}
