//! Provider client.
//!
//! One [`ProviderClient`] serves one provider configuration and credential.
//! Payload encoding is chosen per request: JSON when no reference images are
//! attached, multipart when any are.

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use url::Url;
use vchain_models::{GenerationJob, JobId, ProviderConfig, SegmentSeconds, VideoSize};

use crate::address::{Auth, Endpoints};
use crate::config::ProviderClientConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::metrics::record_request;
use crate::wire::{
    ChatMessage, ChatRequest, ChatResponse, CreateVideoBody, ImageRequestBody, ImageResponse,
    RemixBody, ResponseFormat, VideoJobResponse,
};

/// Sampling temperature for planner completions.
pub const PLANNER_TEMPERATURE: f32 = 0.7;

/// Largest image batch accepted by [`ProviderClient::generate_images`].
pub const MAX_IMAGE_COUNT: u8 = 10;

/// Reference imagery attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceImages {
    /// Single-image continuity reference
    pub input_reference: Option<Bytes>,
    /// Start frame (dual-frame providers)
    pub first_frame: Option<Bytes>,
    /// End frame (dual-frame providers)
    pub last_frame: Option<Bytes>,
}

impl ReferenceImages {
    pub fn is_empty(&self) -> bool {
        self.input_reference.is_none() && self.first_frame.is_none() && self.last_frame.is_none()
    }

    fn parts(&self) -> impl Iterator<Item = (&'static str, &'static str, &Bytes)> + '_ {
        [
            ("input_reference", "frame", self.input_reference.as_ref()),
            ("first_frame", "first-frame", self.first_frame.as_ref()),
            ("last_frame", "last-frame", self.last_frame.as_ref()),
        ]
        .into_iter()
        .filter_map(|(field, stem, bytes)| bytes.map(|b| (field, stem, b)))
    }
}

/// A job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub prompt: String,
    pub seconds: SegmentSeconds,
    pub size: VideoSize,
    pub model: String,
    pub images: ReferenceImages,
    /// Submit as a remix of this job; only the prompt and imagery are sent
    pub remix_of: Option<JobId>,
}

impl SubmitRequest {
    pub fn new(prompt: impl Into<String>, seconds: SegmentSeconds, size: VideoSize, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            seconds,
            size,
            model: model.into(),
            images: ReferenceImages::default(),
            remix_of: None,
        }
    }

    pub fn with_images(mut self, images: ReferenceImages) -> Self {
        self.images = images;
        self
    }

    pub fn remix_of(mut self, parent: JobId) -> Self {
        self.remix_of = Some(parent);
        self
    }
}

/// Image generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: VideoSize,
    pub count: u8,
    /// Hosted model override
    pub model: Option<String>,
}

/// One generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Decoded image bytes
    Bytes(Bytes),
    /// Provider-hosted image URL
    Url(String),
}

/// Operations the pipeline needs from a generation provider.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider configuration this client talks to.
    fn config(&self) -> &ProviderConfig;

    /// Submit a new job (or a remix when `remix_of` is set).
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<GenerationJob>;

    /// Read the current status of a job.
    async fn status(&self, job_id: &JobId) -> ProviderResult<GenerationJob>;

    /// Download the finished video of a completed job.
    async fn fetch_content(&self, job_id: &JobId) -> ProviderResult<Bytes>;

    /// Run a JSON-mode chat completion and return the message content.
    async fn complete_chat(&self, system: &str, user: &str) -> ProviderResult<String>;
}

/// HTTP client for one provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    settings: ProviderClientConfig,
    provider: ProviderConfig,
    auth: Auth,
}

impl ProviderClient {
    /// Validate the configuration and credential, then build the HTTP client.
    pub fn new(
        settings: ProviderClientConfig,
        provider: ProviderConfig,
        credential: &str,
    ) -> ProviderResult<Self> {
        provider.validate()?;
        provider.validate_credential(credential)?;

        let http = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(concat!("vchain-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let auth = Auth::for_provider(&provider, credential);

        Ok(Self {
            http,
            settings,
            provider,
            auth,
        })
    }

    fn endpoints(&self) -> Endpoints<'_> {
        Endpoints::new(&self.provider, &self.settings.hosted_base_url)
    }

    fn model_field<'a>(&self, model: &'a str) -> Option<&'a str> {
        self.provider.includes_model_field().then_some(model)
    }

    /// Model sent with planner completions.
    fn planner_model(&self) -> Option<&str> {
        match &self.provider {
            ProviderConfig::Hosted => Some(self.settings.planner_model.as_str()),
            ProviderConfig::SelfHosted(cfg) => {
                self.model_field(cfg.deployments.planner.as_str())
            }
        }
    }

    /// Model sent with image requests.
    fn image_model<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        match &self.provider {
            ProviderConfig::Hosted => Some(requested.unwrap_or(self.settings.image_model.as_str())),
            ProviderConfig::SelfHosted(cfg) => cfg
                .deployments
                .image_or_fallback()
                .and_then(|d| self.model_field(d)),
        }
    }

    /// Run a request with tracing and metrics.
    async fn execute<T, F>(&self, operation: &'static str, fut: F) -> ProviderResult<T>
    where
        F: std::future::Future<Output = ProviderResult<T>>,
    {
        let provider = self.provider.kind().as_str();
        let span = info_span!("provider_request", operation = %operation, provider = %provider);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, provider, status, latency_ms);

        result
    }

    /// Turn a non-success response into a [`ProviderError::Api`].
    async fn check(response: Response) -> ProviderResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Provider error body: {}", body);
        Err(ProviderError::from_http_status(status.as_u16(), &body))
    }

    async fn read_job(response: Response) -> ProviderResult<GenerationJob> {
        let body = Self::check(response).await?.text().await?;
        let raw: VideoJobResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("malformed job: {}", e)))?;
        raw.into_job()
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, url: Url, body: &B) -> ProviderResult<Response> {
        let request = self.auth.apply(self.http.post(url)).json(body);
        Self::check(request.send().await?).await
    }

    async fn post_form(&self, url: Url, form: Form) -> ProviderResult<Response> {
        let request = self.auth.apply(self.http.post(url)).multipart(form);
        Self::check(request.send().await?).await
    }

    fn attach_images(mut form: Form, images: &ReferenceImages) -> ProviderResult<Form> {
        for (field, stem, bytes) in images.parts() {
            let (mime, ext) = sniff_image(bytes);
            let part = Part::bytes(bytes.to_vec())
                .file_name(format!("{}.{}", stem, ext))
                .mime_str(mime)?;
            form = form.part(field, part);
        }
        Ok(form)
    }

    async fn create(&self, request: &SubmitRequest) -> ProviderResult<GenerationJob> {
        let url = self.endpoints().create_video()?;
        let model = self.model_field(&request.model);

        let response = if request.images.is_empty() {
            let body = CreateVideoBody {
                model,
                prompt: &request.prompt,
                seconds: request.seconds.as_param(),
                size: request.size.to_string(),
            };
            self.post_json(url, &body).await?
        } else {
            let mut form = Form::new()
                .text("prompt", request.prompt.clone())
                .text("seconds", request.seconds.as_param())
                .text("size", request.size.to_string());
            if let Some(model) = model {
                form = form.text("model", model.to_string());
            }
            let form = Self::attach_images(form, &request.images)?;
            self.post_form(url, form).await?
        };

        Self::read_job(response).await
    }

    /// Submit a remix of `parent`. Duration, size and model are inherited
    /// server-side and never re-sent.
    pub async fn remix(
        &self,
        parent: &JobId,
        prompt: &str,
        images: &ReferenceImages,
    ) -> ProviderResult<GenerationJob> {
        require_prompt(prompt)?;
        self.execute("remix", async {
            let url = self.endpoints().remix(parent)?;
            let response = if images.is_empty() {
                self.post_json(url, &RemixBody { prompt }).await?
            } else {
                let form = Self::attach_images(Form::new().text("prompt", prompt.to_string()), images)?;
                self.post_form(url, form).await?
            };

            let mut job = Self::read_job(response).await?;
            job.remixed_from.get_or_insert_with(|| parent.clone());
            info!(job_id = %job.id, parent = %parent, "Remix submitted");
            Ok(job)
        })
        .await
    }

    /// Generate still images, e.g. to seed a first or last frame.
    pub async fn generate_images(&self, request: &ImageRequest) -> ProviderResult<Vec<GeneratedImage>> {
        require_prompt(&request.prompt)?;
        if request.count == 0 || request.count > MAX_IMAGE_COUNT {
            return Err(ProviderError::validation(format!(
                "image count must be between 1 and {}",
                MAX_IMAGE_COUNT
            )));
        }

        self.execute("generate_images", async {
            let url = self.endpoints().images()?;
            let body = ImageRequestBody {
                model: self.image_model(request.model.as_deref()),
                prompt: &request.prompt,
                size: request.size.to_string(),
                n: request.count,
            };
            let response = self.post_json(url, &body).await?;
            let parsed: ImageResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::invalid_response(format!("malformed image response: {}", e)))?;

            let mut images = Vec::with_capacity(parsed.data.len());
            for datum in parsed.data {
                if let Some(revised) = &datum.revised_prompt {
                    debug!("Provider revised image prompt: {}", revised);
                }
                match (datum.b64_json, datum.url) {
                    (Some(b64), _) => {
                        let decoded = base64::engine::general_purpose::STANDARD
                            .decode(b64.trim())
                            .map_err(|e| ProviderError::invalid_response(format!("bad image data: {}", e)))?;
                        images.push(GeneratedImage::Bytes(Bytes::from(decoded)));
                    }
                    (None, Some(url)) => images.push(GeneratedImage::Url(url)),
                    (None, None) => {}
                }
            }

            if images.is_empty() {
                return Err(ProviderError::invalid_response("no images in response"));
            }
            Ok(images)
        })
        .await
    }
}

#[async_trait]
impl GenerationProvider for ProviderClient {
    fn config(&self) -> &ProviderConfig {
        &self.provider
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<GenerationJob> {
        require_prompt(&request.prompt)?;
        if let Some(parent) = &request.remix_of {
            return self.remix(parent, &request.prompt, &request.images).await;
        }

        self.execute("submit", async {
            let job = self.create(request).await?;
            info!(
                job_id = %job.id,
                seconds = request.seconds.as_secs(),
                size = %request.size,
                multipart = !request.images.is_empty(),
                "Job submitted"
            );
            Ok(job)
        })
        .await
    }

    async fn status(&self, job_id: &JobId) -> ProviderResult<GenerationJob> {
        self.execute("status", async {
            let url = self.endpoints().video(job_id)?;
            let response = self.auth.apply(self.http.get(url)).send().await?;
            Self::read_job(response).await
        })
        .await
    }

    async fn fetch_content(&self, job_id: &JobId) -> ProviderResult<Bytes> {
        self.execute("fetch_content", async {
            let url = self.endpoints().content(job_id)?;
            let response = self.auth.apply(self.http.get(url)).send().await?;
            let bytes = Self::check(response).await?.bytes().await?;
            if bytes.is_empty() {
                return Err(ProviderError::invalid_response("empty video content"));
            }
            debug!(job_id = %job_id, bytes = bytes.len(), "Content downloaded");
            Ok(bytes)
        })
        .await
    }

    async fn complete_chat(&self, system: &str, user: &str) -> ProviderResult<String> {
        self.execute("complete_chat", async {
            let url = self.endpoints().chat()?;
            let body = ChatRequest {
                model: self.planner_model(),
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: system,
                    },
                    ChatMessage {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: PLANNER_TEMPERATURE,
                response_format: ResponseFormat { kind: "json_object" },
            };
            let response = self.post_json(url, &body).await?;
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::invalid_response(format!("malformed completion: {}", e)))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| ProviderError::invalid_response("no content in completion"))
        })
        .await
    }
}

fn require_prompt(prompt: &str) -> ProviderResult<()> {
    if prompt.trim().is_empty() {
        return Err(ProviderError::validation("prompt must not be empty"));
    }
    Ok(())
}

/// MIME type and file extension for an encoded image.
fn sniff_image(bytes: &[u8]) -> (&'static str, &'static str) {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => ("image/png", "png"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => ("image/webp", "webp"),
        _ => ("image/jpeg", "jpg"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(&[0x89, b'P', b'N', b'G', 0x0D]), ("image/png", "png"));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF]), ("image/jpeg", "jpg"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), ("image/webp", "webp"));
    }

    #[test]
    fn test_reference_parts_order() {
        let images = ReferenceImages {
            input_reference: None,
            first_frame: Some(Bytes::from_static(b"a")),
            last_frame: Some(Bytes::from_static(b"b")),
        };
        let fields: Vec<_> = images.parts().map(|(field, _, _)| field).collect();
        assert_eq!(fields, vec!["first_frame", "last_frame"]);
        assert!(ReferenceImages::default().is_empty());
    }
}
