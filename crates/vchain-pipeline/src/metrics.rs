//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    pub const SEGMENTS_COMPLETED_TOTAL: &str = "vchain_segments_completed_total";
    pub const SEGMENTS_FAILED_TOTAL: &str = "vchain_segments_failed_total";
    pub const JOBS_POLLED_TOTAL: &str = "vchain_jobs_polled_total";
    pub const RUNS_TOTAL: &str = "vchain_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "vchain_run_duration_seconds";
    pub const REMIXES_TOTAL: &str = "vchain_remixes_total";
}

pub fn record_segment(outcome: &'static str) {
    let name = if outcome == "completed" {
        names::SEGMENTS_COMPLETED_TOTAL
    } else {
        names::SEGMENTS_FAILED_TOTAL
    };
    counter!(name).increment(1);
}

pub fn record_poll() {
    counter!(names::JOBS_POLLED_TOTAL).increment(1);
}

/// Record a finished run of `operation` (`generate` or `remix`).
pub fn record_run(operation: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "error" };
    counter!(names::RUNS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "operation" => operation).record(duration_secs);
    if operation == "remix" && success {
        counter!(names::REMIXES_TOTAL).increment(1);
    }
}
