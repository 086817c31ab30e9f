//! Pipeline error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use vchain_media::MediaError;
use vchain_models::{JobId, ModelError};
use vchain_provider::ProviderError;

pub type PipelineResult<T> = Result<T, PipelineError>;
pub type PlanningResult<T> = Result<T, PlanningError>;
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors from the segment planner. None of them touch history.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Expected {expected} segments, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Invalid planning request: {0}")]
    Validation(String),

    #[error("Planning request failed: {0}")]
    Provider(#[from] ProviderError),
}

impl PlanningError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPlan(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors from a history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("No history record for job {0}")]
    NotFound(JobId),

    #[error("History already holds job {0}")]
    Duplicate(JobId),

    #[error("Remix parent {0} is not in history")]
    UnknownParent(JobId),

    #[error("History file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal error of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller input rejected before anything was submitted.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// The provider finished the job with a failed status.
    #[error("Generation failed for job {job_id}: {message}")]
    GenerationFailed { job_id: JobId, message: String },

    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Frame extraction failed: {0}")]
    FrameExtraction(#[source] MediaError),

    #[error("Concatenation failed: {0}")]
    Concatenation(#[source] MediaError),

    /// Remix attempted after the parent's remix window closed.
    #[error("Video {job_id} expired at {expired_at}")]
    Expired {
        job_id: JobId,
        expired_at: DateTime<Utc>,
    },

    #[error("Job {job_id} did not finish after {attempts} polls")]
    PollTimeout { job_id: JobId, attempts: u32 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Failure attributed to one segment of a run.
    #[error("Segment {index} failed: {source}")]
    Segment {
        index: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Attribute this error to segment `index`.
    pub fn in_segment(self, index: usize) -> Self {
        match self {
            already @ PipelineError::Segment { .. } => already,
            other => PipelineError::Segment {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Index of the failing segment, if the error is attributed to one.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            PipelineError::Segment { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// The underlying error with any segment attribution removed.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Segment { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), PipelineError::Validation(_))
    }

    /// Whether re-running the same request could succeed. Nothing retries
    /// automatically.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            PipelineError::Provider(e) => e.is_retryable(),
            PipelineError::PollTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => PipelineError::Validation(msg),
            other => PipelineError::Provider(other),
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_attribution_is_not_nested() {
        let err = PipelineError::validation("bad").in_segment(2).in_segment(5);
        assert_eq!(err.segment_index(), Some(2));
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Segment 2 failed: Validation failed: bad");
    }

    #[test]
    fn test_provider_validation_maps_to_validation() {
        let err: PipelineError = ProviderError::validation("missing endpoint").into();
        assert!(matches!(err, PipelineError::Validation(_)));

        let err: PipelineError = ProviderError::api(503, "busy").into();
        assert!(matches!(err, PipelineError::Provider(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_generation_failed_message() {
        let err = PipelineError::GenerationFailed {
            job_id: JobId::from("video_1"),
            message: "Video generation failed".into(),
        };
        assert_eq!(err.to_string(), "Generation failed for job video_1: Video generation failed");
        assert!(!err.is_retryable());
    }
}
