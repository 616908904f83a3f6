//! Structured task logging.

use tracing::{error, info, warn, Span};

use cliptrim_models::{OutputFormat, TaskId};

/// Consistent lifecycle log lines for one clip task.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    format: OutputFormat,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, format: OutputFormat) -> Self {
        Self {
            task_id: task_id.to_string(),
            format,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(task_id = %self.task_id, format = %self.format, "Task started: {}", message);
    }

    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(task_id = %self.task_id, stage, "Task stage: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(task_id = %self.task_id, "Task warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(task_id = %self.task_id, format = %self.format, "Task failed: {}", message);
    }

    pub fn log_completion(&self, filename: &str) {
        info!(task_id = %self.task_id, format = %self.format, filename, "Task completed");
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span used to instrument the background task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("task", task_id = %self.task_id, format = %self.format)
    }
}
