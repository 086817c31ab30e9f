//! Provider wire formats.

use serde::{Deserialize, Serialize};
use vchain_models::{GenerationJob, JobId, JobStatus};

use crate::error::{ProviderError, ProviderResult};

/// JSON body for `POST /videos`.
#[derive(Debug, Serialize)]
pub(crate) struct CreateVideoBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub prompt: &'a str,
    pub seconds: &'a str,
    pub size: String,
}

/// JSON body for `POST /videos/{id}/remix`.
#[derive(Debug, Serialize)]
pub(crate) struct RemixBody<'a> {
    pub prompt: &'a str,
}

/// Video job as returned by create, remix and status calls.
#[derive(Debug, Deserialize)]
pub(crate) struct VideoJobResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<JobErrorDetail>,
    #[serde(default)]
    pub remixed_from_video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl VideoJobResponse {
    /// Normalize into a [`GenerationJob`].
    pub fn into_job(self) -> ProviderResult<GenerationJob> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(ProviderError::invalid_response)?;

        let progress = self
            .progress
            .filter(|p| p.is_finite())
            .map(|p| p.round().clamp(0.0, 100.0) as u8);

        Ok(GenerationJob {
            id: JobId::from(self.id),
            status,
            progress,
            error_message: self.error.and_then(|e| e.message),
            remixed_from: self.remixed_from_video_id.map(JobId::from),
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageRequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub prompt: &'a str,
    pub size: String,
    pub n: u8,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageResponse {
    #[serde(default)]
    pub data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageDatum {
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_normalization() {
        let raw: VideoJobResponse = serde_json::from_str(
            r#"{"id":"video_1","object":"video","status":"succeeded","progress":104.6}"#,
        )
        .unwrap();
        let job = raw.into_job().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, Some(100));
    }

    #[test]
    fn test_failed_job_message() {
        let raw: VideoJobResponse = serde_json::from_str(
            r#"{"id":"video_1","status":"failed","error":{"code":"moderation","message":"blocked"}}"#,
        )
        .unwrap();
        let job = raw.into_job().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_message(), "blocked");
    }

    #[test]
    fn test_unknown_status_rejected() {
        let raw: VideoJobResponse =
            serde_json::from_str(r#"{"id":"video_1","status":"warming_up"}"#).unwrap();
        assert!(matches!(raw.into_job(), Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn test_create_body_omits_model() {
        let body = CreateVideoBody {
            model: None,
            prompt: "a cat",
            seconds: "4",
            size: "1280x720".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["seconds"], "4");
    }
}
