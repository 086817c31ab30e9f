//! In-process fakes for pipeline tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use vchain_media::{MediaBackend, MediaError, MediaResult, PercentCallback};
use vchain_models::{GenerationJob, JobId, JobStatus, ProviderConfig, VideoSize};
use vchain_provider::{GenerationProvider, ProviderError, ProviderResult, SubmitRequest};

type Script = VecDeque<(JobStatus, Option<u8>)>;

#[derive(Default)]
struct ProviderState {
    submitted: Vec<SubmitRequest>,
    scripts: HashMap<String, Script>,
    status_calls: usize,
    content_calls: usize,
    chat_calls: usize,
    chat_reply: String,
    last_chat: Option<(String, String)>,
    chat_error: Option<ProviderError>,
    fail_submit_at: Option<usize>,
    fail_job_at: Option<usize>,
    status_id_prefix: Option<String>,
}

/// Scripted provider. Submissions are numbered from zero and get job ids
/// `job-0`, `job-1`, ...; unscripted jobs complete on the first status read.
pub struct FakeProvider {
    config: ProviderConfig,
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::with_config(ProviderConfig::Hosted)
    }

    pub fn with_config(config: ProviderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ProviderState::default()),
        }
    }

    pub fn script_status(&self, job_id: &str, statuses: Vec<(JobStatus, Option<u8>)>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(job_id.to_string(), statuses.into());
    }

    pub fn set_chat_reply(&self, reply: &str) {
        self.state.lock().unwrap().chat_reply = reply.to_string();
    }

    /// Fail the next chat call with `error`.
    pub fn fail_chat(&self, error: ProviderError) {
        self.state.lock().unwrap().chat_error = Some(error);
    }

    /// Reject submission number `index` with an upstream error.
    pub fn fail_submit_at(&self, index: usize) {
        self.state.lock().unwrap().fail_submit_at = Some(index);
    }

    /// Let submission number `index` end in a failed job.
    pub fn fail_job_at(&self, index: usize) {
        self.state.lock().unwrap().fail_job_at = Some(index);
    }

    /// Answer status reads under `<prefix><job id>` instead of the asked id.
    pub fn rename_status_ids(&self, prefix: &str) {
        self.state.lock().unwrap().status_id_prefix = Some(prefix.to_string());
    }

    pub fn submitted(&self) -> Vec<SubmitRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    pub fn content_calls(&self) -> usize {
        self.state.lock().unwrap().content_calls
    }

    pub fn chat_calls(&self) -> usize {
        self.state.lock().unwrap().chat_calls
    }

    pub fn last_chat(&self) -> Option<(String, String)> {
        self.state.lock().unwrap().last_chat.clone()
    }

    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.submitted.len() + state.status_calls + state.content_calls + state.chat_calls
    }
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<GenerationJob> {
        let mut state = self.state.lock().unwrap();
        let index = state.submitted.len();
        state.submitted.push(request.clone());

        if state.fail_submit_at == Some(index) {
            return Err(ProviderError::api(500, "upstream exploded"));
        }

        let id = format!("job-{}", index);
        if state.fail_job_at == Some(index) {
            state.scripts.insert(
                id.clone(),
                vec![(JobStatus::InProgress, Some(50)), (JobStatus::Failed, None)].into(),
            );
        }

        let mut job = GenerationJob::queued(id);
        job.remixed_from = request.remix_of.clone();
        Ok(job)
    }

    async fn status(&self, job_id: &JobId) -> ProviderResult<GenerationJob> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;

        let (status, progress) = match state.scripts.get_mut(job_id.as_str()) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().copied().unwrap_or((JobStatus::Completed, Some(100))),
            None => (JobStatus::Completed, Some(100)),
        };

        let id = match &state.status_id_prefix {
            Some(prefix) => JobId::from(format!("{}{}", prefix, job_id)),
            None => job_id.clone(),
        };
        let job = GenerationJob::queued(id).with_status(status);
        Ok(match progress {
            Some(p) => job.with_progress(p),
            None => job,
        })
    }

    async fn fetch_content(&self, job_id: &JobId) -> ProviderResult<Bytes> {
        self.state.lock().unwrap().content_calls += 1;
        Ok(Bytes::from(format!("video:{}", job_id)))
    }

    async fn complete_chat(&self, system: &str, user: &str) -> ProviderResult<String> {
        let mut state = self.state.lock().unwrap();
        state.chat_calls += 1;
        state.last_chat = Some((system.to_string(), user.to_string()));
        match state.chat_error.take() {
            Some(e) => Err(e),
            None => Ok(state.chat_reply.clone()),
        }
    }
}

#[derive(Default)]
struct MediaState {
    extracted: Vec<Bytes>,
    concatenations: usize,
    resized: Vec<VideoSize>,
    fail_extract: bool,
    fail_concat: bool,
}

/// Media backend that tags bytes instead of decoding them.
///
/// Frames come back as `frame:<input>`, joins as `a+b+...`.
#[derive(Default)]
pub struct FakeMedia {
    state: Mutex<MediaState>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_extract(&self) {
        self.state.lock().unwrap().fail_extract = true;
    }

    pub fn fail_concat(&self) {
        self.state.lock().unwrap().fail_concat = true;
    }

    pub fn extracted(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().extracted.clone()
    }

    pub fn concatenations(&self) -> usize {
        self.state.lock().unwrap().concatenations
    }

    pub fn resized(&self) -> Vec<VideoSize> {
        self.state.lock().unwrap().resized.clone()
    }
}

#[async_trait]
impl MediaBackend for FakeMedia {
    async fn extract_last_frame(&self, video: &Bytes) -> MediaResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        if state.fail_extract {
            return Err(MediaError::invalid_video("no decodable frames"));
        }
        state.extracted.push(video.clone());
        Ok(Bytes::from(format!("frame:{}", String::from_utf8_lossy(video))))
    }

    async fn concatenate(&self, videos: &[Bytes], on_progress: PercentCallback) -> MediaResult<Bytes> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_concat {
                return Err(MediaError::internal("concat exploded"));
            }
            state.concatenations += 1;
        }
        on_progress(50);
        on_progress(100);
        let joined: Vec<String> = videos
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect();
        Ok(Bytes::from(joined.join("+")))
    }

    async fn resize_image(&self, image: &Bytes, size: VideoSize) -> MediaResult<Bytes> {
        self.state.lock().unwrap().resized.push(size);
        Ok(Bytes::from(format!("resized:{}:{}", size, String::from_utf8_lossy(image))))
    }
}
