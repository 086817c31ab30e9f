//! Planned segments produced by the segment planner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::segment::{SegmentRequest, SegmentSeconds, VideoSize};

/// One continuity-aware sub-prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedSegment {
    pub title: String,
    /// Always the caller-requested duration, never the text model's
    pub seconds: SegmentSeconds,
    pub prompt: String,
}

impl PlannedSegment {
    pub fn new(title: impl Into<String>, seconds: SegmentSeconds, prompt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            seconds,
            prompt: prompt.into(),
        }
    }

    /// Turn this planned segment into a pipeline request.
    pub fn to_request(&self, size: VideoSize, model: impl Into<String>) -> SegmentRequest {
        SegmentRequest::new(self.prompt.clone(), self.seconds, size, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_request_keeps_prompt_and_seconds() {
        let planned = PlannedSegment::new("Generation 1", SegmentSeconds::Eight, "a cat rolls in");
        let request = planned.to_request(VideoSize::new(720, 1280), "sora-2");
        assert_eq!(request.prompt, "a cat rolls in");
        assert_eq!(request.seconds, SegmentSeconds::Eight);
        assert_eq!(request.size.to_string(), "720x1280");
    }
}
