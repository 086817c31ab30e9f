//! Segment models.
//!
//! A [`Segment`] is one independently generated unit of video. The
//! orchestrator owns the authoritative sequence and advances each segment
//! through consuming transition methods, so every progress tick yields a new
//! value instead of mutating a shared one.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::job::JobId;

/// Allowed per-segment durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SegmentSeconds {
    Four,
    Eight,
    Twelve,
}

impl SegmentSeconds {
    pub const ALL: [SegmentSeconds; 3] = [SegmentSeconds::Four, SegmentSeconds::Eight, SegmentSeconds::Twelve];

    pub fn as_secs(&self) -> u32 {
        match self {
            SegmentSeconds::Four => 4,
            SegmentSeconds::Eight => 8,
            SegmentSeconds::Twelve => 12,
        }
    }

    /// String form sent to the provider (`"4"`, `"8"`, `"12"`).
    pub fn as_param(&self) -> &'static str {
        match self {
            SegmentSeconds::Four => "4",
            SegmentSeconds::Eight => "8",
            SegmentSeconds::Twelve => "12",
        }
    }
}

impl TryFrom<u32> for SegmentSeconds {
    type Error = ModelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(SegmentSeconds::Four),
            8 => Ok(SegmentSeconds::Eight),
            12 => Ok(SegmentSeconds::Twelve),
            other => Err(ModelError::InvalidSeconds(other)),
        }
    }
}

impl From<SegmentSeconds> for u32 {
    fn from(value: SegmentSeconds) -> Self {
        value.as_secs()
    }
}

impl FromStr for SegmentSeconds {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| ModelError::validation(format!("seconds must be a number, got '{}'", s)))?;
        SegmentSeconds::try_from(value)
    }
}

impl fmt::Display for SegmentSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_secs())
    }
}

impl JsonSchema for SegmentSeconds {
    fn schema_name() -> String {
        "SegmentSeconds".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <u32>::json_schema(gen)
    }
}

/// Output resolution, written `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for VideoSize {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl FromStr for VideoSize {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| ModelError::InvalidSize(s.to_string()))?;
        let width: u32 = w.parse().map_err(|_| ModelError::InvalidSize(s.to_string()))?;
        let height: u32 = h.parse().map_err(|_| ModelError::InvalidSize(s.to_string()))?;
        if width == 0 || height == 0 {
            return Err(ModelError::InvalidSize(s.to_string()));
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for VideoSize {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VideoSize> for String {
    fn from(value: VideoSize) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl JsonSchema for VideoSize {
    fn schema_name() -> String {
        "VideoSize".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <String>::json_schema(gen)
    }
}

/// Caller request for one segment of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SegmentRequest {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    pub seconds: SegmentSeconds,
    pub size: VideoSize,
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
}

impl SegmentRequest {
    pub fn new(
        prompt: impl Into<String>,
        seconds: SegmentSeconds,
        size: VideoSize,
        model: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            seconds,
            size,
            model: model.into(),
        }
    }

    /// Validate the request, rejecting whitespace-only prompts.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()?;
        if self.prompt.trim().is_empty() {
            return Err(ModelError::MissingField("prompt"));
        }
        Ok(())
    }
}

/// Segment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Generating => "generating",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentStatus::Completed | SegmentStatus::Failed)
    }
}

/// One unit of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Zero-based position in the run
    pub index: usize,
    pub prompt: String,
    pub seconds: SegmentSeconds,
    pub size: VideoSize,
    pub model: String,
    pub status: SegmentStatus,
    /// Progress (0-100)
    pub progress: u8,
    /// Downloaded media, kept in memory for the run only
    #[serde(skip)]
    pub media: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Segment {
    /// Create a pending segment from a request.
    pub fn pending(index: usize, request: &SegmentRequest) -> Self {
        Self {
            index,
            prompt: request.prompt.clone(),
            seconds: request.seconds,
            size: request.size,
            model: request.model.clone(),
            status: SegmentStatus::Pending,
            progress: 0,
            media: None,
            job_id: None,
            created_at: None,
            error: None,
        }
    }

    /// Start generating.
    pub fn start(mut self) -> Self {
        if self.status == SegmentStatus::Pending {
            self.status = SegmentStatus::Generating;
        }
        self
    }

    /// Record the provider job backing this segment.
    pub fn submitted(mut self, job_id: JobId) -> Self {
        if !self.status.is_terminal() {
            self.job_id = Some(job_id);
        }
        self
    }

    /// Update progress while generating.
    pub fn with_progress(mut self, progress: u8) -> Self {
        if self.status == SegmentStatus::Generating {
            self.progress = progress.min(100);
        }
        self
    }

    /// Mark completed with its downloaded media.
    pub fn complete(mut self, media: Bytes, at: DateTime<Utc>) -> Self {
        if !self.status.is_terminal() {
            self.status = SegmentStatus::Completed;
            self.progress = 100;
            self.media = Some(media);
            self.created_at = Some(at);
        }
        self
    }

    /// Mark failed with the triggering error message.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        if !self.status.is_terminal() {
            self.status = SegmentStatus::Failed;
            self.error = Some(error.into());
        }
        self
    }

    /// Mark failed because a step after generation broke, e.g. frame
    /// extraction. Unlike [`Segment::fail`] this also applies to a
    /// completed segment; the media is dropped.
    pub fn fail_after_completion(mut self, error: impl Into<String>) -> Self {
        if self.status != SegmentStatus::Failed {
            self.status = SegmentStatus::Failed;
            self.media = None;
            self.error = Some(error.into());
        }
        self
    }

    /// Copy of this segment without its media payload.
    pub fn without_media(&self) -> Self {
        Self {
            media: None,
            ..self.clone()
        }
    }
}
