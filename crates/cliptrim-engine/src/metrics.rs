//! Task counters. The recorder is installed by the embedding server.

use metrics::counter;

pub mod names {
    pub const TASKS_SUBMITTED_TOTAL: &str = "cliptrim_tasks_submitted_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "cliptrim_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "cliptrim_tasks_failed_total";
    pub const CLEANUP_WARNINGS_TOTAL: &str = "cliptrim_cleanup_warnings_total";
}

pub fn record_task_submitted(format: &str) {
    let labels = [("format", format.to_string())];
    counter!(names::TASKS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_task_completed(format: &str) {
    let labels = [("format", format.to_string())];
    counter!(names::TASKS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_task_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::TASKS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_cleanup_warnings(count: usize) {
    if count > 0 {
        counter!(names::CLEANUP_WARNINGS_TOTAL).increment(count as u64);
    }
}
