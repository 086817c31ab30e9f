//! Persisted history records.
//!
//! Records are append-only. The only in-place change ever allowed is bumping
//! a parent's `remix_count` when a remix of it completes. Expiry is always
//! recomputed from `created_at` and the read time; the stored `is_expired`
//! flag is informational.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::provider::ProviderKind;
use crate::segment::{SegmentRequest, SegmentSeconds, VideoSize};

/// Hours a generated job remains remixable.
pub const REMIX_WINDOW_HOURS: i64 = 24;

/// Generation parameters recorded with a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationParameters {
    pub seconds: SegmentSeconds,
    pub size: VideoSize,
    pub model: String,
}

impl From<&SegmentRequest> for GenerationParameters {
    fn from(request: &SegmentRequest) -> Self {
        Self {
            seconds: request.seconds,
            size: request.size,
            model: request.model.clone(),
        }
    }
}

/// History record for one completed segment or remix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub job_id: JobId,
    pub local_id: String,
    pub prompt: String,
    pub provider: ProviderKind,
    pub parameters: GenerationParameters,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remixed_from: Option<JobId>,
    #[serde(default)]
    pub remix_count: u32,
    #[serde(default)]
    pub is_expired: bool,
}

impl VideoMetadata {
    /// Create a record for a freshly completed job.
    pub fn new(
        job_id: JobId,
        local_id: impl Into<String>,
        prompt: impl Into<String>,
        provider: ProviderKind,
        parameters: GenerationParameters,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            local_id: local_id.into(),
            prompt: prompt.into(),
            provider,
            parameters,
            created_at,
            expires_at: Self::expiry_for(created_at),
            remixed_from: None,
            remix_count: 0,
            is_expired: false,
        }
    }

    /// Create a record for a remix of `parent`, inheriting its parameters.
    pub fn remix_of(
        parent: &VideoMetadata,
        job_id: JobId,
        local_id: impl Into<String>,
        prompt: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::new(
            job_id,
            local_id,
            prompt,
            parent.provider,
            parent.parameters.clone(),
            created_at,
        );
        record.remixed_from = Some(parent.job_id.clone());
        record
    }

    /// `created_at + 24h`.
    pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::hours(REMIX_WINDOW_HOURS)
    }

    /// True iff `now` is strictly after the remix window closes.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > Self::expiry_for(self.created_at)
    }

    /// Copy with `is_expired` recomputed for `now`.
    pub fn refreshed(mut self, now: DateTime<Utc>) -> Self {
        self.expires_at = Self::expiry_for(self.created_at);
        self.is_expired = self.is_expired_at(now);
        self
    }

    /// Time left in the remix window, zero once expired.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        let left = Self::expiry_for(self.created_at) - now;
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }
}

/// Whether `record` is past its remix window at `now`.
pub fn is_video_expired(record: &VideoMetadata, now: DateTime<Utc>) -> bool {
    record.is_expired_at(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(created_at: DateTime<Utc>) -> VideoMetadata {
        VideoMetadata::new(
            JobId::from("video_1"),
            "segment-0",
            "a cat on a skateboard",
            ProviderKind::Hosted,
            GenerationParameters {
                seconds: SegmentSeconds::Four,
                size: VideoSize::default(),
                model: "sora-2".into(),
            },
            created_at,
        )
    }

    #[test]
    fn test_expiry_boundary_millisecond() {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let meta = record(created);
        assert_eq!(meta.expires_at, created + Duration::hours(24));

        assert!(!meta.is_expired_at(meta.expires_at));
        assert!(meta.is_expired_at(meta.expires_at + Duration::milliseconds(1)));
        assert!(!is_video_expired(&meta, created));
    }

    #[test]
    fn test_stored_flag_is_not_trusted() {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut meta = record(created);
        meta.is_expired = true;
        meta.expires_at = created;

        let fresh = meta.refreshed(created + Duration::hours(1));
        assert!(!fresh.is_expired);
        assert_eq!(fresh.expires_at, created + Duration::hours(24));
    }

    #[test]
    fn test_remix_inherits_parameters() {
        let parent = record(Utc::now());
        let remix = VideoMetadata::remix_of(
            &parent,
            JobId::from("video_2"),
            "remix-1",
            "same scene, golden hour lighting",
            Utc::now(),
        );
        assert_eq!(remix.remixed_from, Some(parent.job_id.clone()));
        assert_eq!(remix.parameters, parent.parameters);
        assert_eq!(remix.remix_count, 0);
    }

    #[test]
    fn test_time_remaining_saturates() {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let meta = record(created);
        assert_eq!(meta.time_remaining(created + Duration::hours(30)), Duration::zero());
        assert_eq!(meta.time_remaining(created + Duration::hours(23)), Duration::hours(1));
    }

    #[test]
    fn test_serialized_field_names() {
        let meta = record(Utc::now());
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("jobId").is_some());
        assert!(json.get("remixCount").is_some());
        assert!(json.get("remixedFrom").is_none());
    }
}
