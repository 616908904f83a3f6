//! Shared data models for the ClipTrim backend.
//!
//! This crate provides Serde-serializable types for:
//! - Clip requests and task identifiers
//! - Progress events streamed to clients
//! - Time string parsing
//! - Input validation (URL whitelist, time strings, filename sanitization)

pub mod progress;
pub mod task;
pub mod timestamp;
pub mod validation;

pub use progress::{ProgressEvent, TaskStatus};
pub use task::{ClipRequest, OutputFormat, TaskId, TEMP_PREFIX};
pub use timestamp::{compute_duration, format_seconds, is_valid_time_string, parse_time_to_seconds};
pub use validation::{
    is_safe_filename, sanitize_filename, validate_video_url, ValidatedClip, ValidationError,
    ValidationResult,
};
