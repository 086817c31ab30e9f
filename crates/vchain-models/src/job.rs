//! Generation job lifecycle.
//!
//! A job is created by the provider on submission and only ever advanced by
//! re-reading its status. `Completed` and `Failed` are terminal.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback message when a failed job carries no upstream reason.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Video generation failed";

/// Provider-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Normalized job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not started
    #[default]
    #[serde(alias = "pending")]
    Queued,
    /// Being generated
    #[serde(alias = "processing", alias = "running", alias = "preprocessing")]
    InProgress,
    /// Finished, content available
    #[serde(alias = "succeeded")]
    Completed,
    /// Finished without content
    #[serde(alias = "cancelled")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => Ok(JobStatus::Queued),
            "in_progress" | "processing" | "running" | "preprocessing" => Ok(JobStatus::InProgress),
            "completed" | "succeeded" => Ok(JobStatus::Completed),
            "failed" | "cancelled" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A provider-side generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Provider job ID
    pub id: JobId,
    /// Normalized status
    pub status: JobStatus,
    /// Progress (0-100), when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Upstream failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Parent job for remixes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remixed_from: Option<JobId>,
}

impl GenerationJob {
    /// Create a freshly queued job.
    pub fn queued(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            progress: None,
            error_message: None,
            remixed_from: None,
        }
    }

    /// Set progress, clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advance this job with a freshly read status.
    ///
    /// A terminal job is never changed; a read for a different job is ignored.
    pub fn advance(self, latest: GenerationJob) -> Self {
        if self.is_terminal() || latest.id != self.id {
            return self;
        }
        latest
    }

    /// Failure reason, falling back to a generic message.
    pub fn failure_message(&self) -> String {
        self.error_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_aliases() {
        let parsed: JobStatus = serde_json::from_str("\"succeeded\"").unwrap();
        assert_eq!(parsed, JobStatus::Completed);
        let parsed: JobStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, JobStatus::InProgress);
        assert_eq!("Pending".parse::<JobStatus>().unwrap(), JobStatus::Queued);
        assert!("exploded".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_job_is_frozen() {
        let done = GenerationJob::queued("job-1").with_status(JobStatus::Completed);
        let late = GenerationJob::queued("job-1")
            .with_status(JobStatus::Failed)
            .with_progress(10);
        let still = done.clone().advance(late);
        assert_eq!(still, done);
    }

    #[test]
    fn test_advance_replaces_non_terminal() {
        let job = GenerationJob::queued("job-1");
        let next = GenerationJob::queued("job-1")
            .with_status(JobStatus::InProgress)
            .with_progress(250);
        let advanced = job.advance(next);
        assert_eq!(advanced.status, JobStatus::InProgress);
        assert_eq!(advanced.progress, Some(100));
    }

    #[test]
    fn test_advance_ignores_other_job() {
        let job = GenerationJob::queued("job-1");
        let other = GenerationJob::queued("job-2").with_status(JobStatus::Completed);
        assert_eq!(job.clone().advance(other), job);
    }

    #[test]
    fn test_failure_message_fallback() {
        let mut job = GenerationJob::queued("job-1").with_status(JobStatus::Failed);
        assert_eq!(job.failure_message(), DEFAULT_FAILURE_MESSAGE);
        job.error_message = Some("content policy".into());
        assert_eq!(job.failure_message(), "content policy");
    }
}
