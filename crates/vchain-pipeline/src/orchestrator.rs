//! Pipeline orchestrator.
//!
//! Runs N segments strictly in order: submit, poll, download, commit a
//! history record, then extract the last frame to seed the next segment.
//! Any failure aborts the run. Records already committed stay in history.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;
use vchain_media::{MediaBackend, PercentCallback};
use vchain_models::progress::{assembly_progress, estimate_output_bytes, generation_progress, MEMORY_WARNING_BYTES};
use vchain_models::{
    GenerationParameters, PlannedSegment, RunState, Segment, SegmentRequest, SegmentSeconds, VideoMetadata,
    VideoSize,
};
use vchain_provider::{GenerationProvider, ReferenceImages, SubmitRequest};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, PlanningResult};
use crate::history::HistoryStore;
use crate::logging::RunLogger;
use crate::metrics::{record_run, record_segment};
use crate::planner::SegmentPlanner;
use crate::poller::JobPoller;
use crate::progress::{ProgressCallback, ProgressEvent};

/// Input of a generation run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub segments: Vec<SegmentRequest>,
    /// Caller image used as the opening frame of segment 0
    pub first_frame: Option<Bytes>,
    /// Caller image used as the closing frame of the final segment
    /// (dual-frame providers only)
    pub last_frame: Option<Bytes>,
}

impl RunRequest {
    pub fn new(segments: Vec<SegmentRequest>) -> Self {
        Self {
            segments,
            ..Default::default()
        }
    }

    pub fn with_first_frame(mut self, image: Bytes) -> Self {
        self.first_frame = Some(image);
        self
    }

    pub fn with_last_frame(mut self, image: Bytes) -> Self {
        self.last_frame = Some(image);
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: String,
    /// Final clip
    pub media: Bytes,
    /// Final segment values, without media
    pub segments: Vec<Segment>,
    /// History records committed by this run, in segment order
    pub records: Vec<VideoMetadata>,
}

/// Generation pipeline bound to one provider, media backend and history.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) provider: Arc<dyn GenerationProvider>,
    pub(crate) media: Arc<dyn MediaBackend>,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) config: PipelineConfig,
    pub(crate) cancel_rx: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        media: Arc<dyn MediaBackend>,
        history: Arc<dyn HistoryStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            media,
            history,
            config,
            cancel_rx: None,
        }
    }

    /// Abort submission and polling when `cancel_rx` flips to true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Plan `count` segments from one base prompt.
    pub async fn plan(
        &self,
        base_prompt: &str,
        seconds: SegmentSeconds,
        count: usize,
    ) -> PlanningResult<Vec<PlannedSegment>> {
        SegmentPlanner::new(Arc::clone(&self.provider))
            .plan(base_prompt, seconds, count)
            .await
    }

    pub(crate) fn poller(&self) -> JobPoller {
        let poller = JobPoller::new(Arc::clone(&self.provider), self.config.poll.clone());
        match &self.cancel_rx {
            Some(rx) => poller.with_cancel(rx.clone()),
            None => poller,
        }
    }

    pub(crate) fn ensure_not_cancelled(&self) -> PipelineResult<()> {
        match &self.cancel_rx {
            Some(rx) if *rx.borrow() => Err(PipelineError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Generate every segment in order and assemble the final clip.
    pub async fn run(&self, request: RunRequest, on_progress: ProgressCallback) -> PipelineResult<RunOutput> {
        let run_id = Uuid::new_v4().to_string();
        let logger = RunLogger::new(&run_id, "generate");
        let span = logger.create_span();
        let started = Instant::now();

        let result = self
            .run_segments(&logger, request, &on_progress)
            .instrument(span)
            .await;

        record_run("generate", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn run_segments(
        &self,
        logger: &RunLogger,
        request: RunRequest,
        on_progress: &ProgressCallback,
    ) -> PipelineResult<RunOutput> {
        validate_segments(&request.segments)?;

        let total = request.segments.len();
        let size = request.segments[0].size;
        let dual_frames = self.provider.config().supports_dual_frames();
        logger.log_start(&format!("{} segment(s) at {}", total, size));

        let estimate: u64 = request
            .segments
            .iter()
            .map(|s| estimate_output_bytes(s.seconds, 1))
            .sum();
        if estimate > MEMORY_WARNING_BYTES {
            let notice = format!(
                "Estimated output is {} MiB; the run may exhaust memory",
                estimate / (1024 * 1024)
            );
            logger.log_warning(&notice);
            on_progress(ProgressEvent::Notice(notice));
        }

        if request.last_frame.is_some() && !dual_frames {
            logger.log_warning("Provider accepts one reference image; ignoring last frame");
        }

        let first_frame = self.prepare_reference(request.first_frame.as_ref(), size).await?;
        let last_frame = if dual_frames {
            self.prepare_reference(request.last_frame.as_ref(), size).await?
        } else {
            None
        };

        let mut segments: Vec<Segment> = request
            .segments
            .iter()
            .enumerate()
            .map(|(i, r)| Segment::pending(i, r))
            .collect();
        let mut state = RunState::Idle;
        let mut clips: Vec<Bytes> = Vec::with_capacity(total);
        let mut records: Vec<VideoMetadata> = Vec::with_capacity(total);
        let mut carried: Option<Bytes> = None;

        on_progress(ProgressEvent::Overall(0));

        for index in 0..total {
            state = state.run_segment(index);
            on_progress(ProgressEvent::State(state.clone()));

            let images = reference_images(
                dual_frames,
                index,
                total,
                first_frame.as_ref(),
                last_frame.as_ref(),
                carried.as_ref(),
            );

            let outcome = self
                .generate_segment(
                    &mut segments[index],
                    &request.segments[index],
                    images,
                    total,
                    on_progress,
                )
                .await;

            let (clip, record) = match outcome {
                Ok(done) => done,
                Err(e) => {
                    return Err(self.abort(logger, state, &mut segments[index], e, on_progress));
                }
            };
            records.push(record);

            if index + 1 < total {
                logger.log_progress(&format!("Extracting continuity frame from segment {}", index));
                match self.media.extract_last_frame(&clip).await {
                    Ok(frame) => carried = Some(frame),
                    Err(e) => {
                        let err = PipelineError::FrameExtraction(e);
                        return Err(self.abort(logger, state, &mut segments[index], err, on_progress));
                    }
                }
            }
            clips.push(clip);
        }

        let media = if total == 1 {
            clips.pop().ok_or_else(|| PipelineError::validation("no segments"))?
        } else {
            state = state.assemble();
            on_progress(ProgressEvent::State(state.clone()));
            logger.log_progress(&format!("Joining {} segments", total));

            let forward = Arc::clone(on_progress);
            let percent: PercentCallback =
                Arc::new(move |p| forward(ProgressEvent::Overall(assembly_progress(p))));
            match self.media.concatenate(&clips, percent).await {
                Ok(joined) => joined,
                Err(e) => {
                    let err = PipelineError::Concatenation(e);
                    state = state.fail(err.to_string());
                    on_progress(ProgressEvent::State(state));
                    logger.log_error(&err.to_string());
                    return Err(err);
                }
            }
        };

        state = state.succeed();
        on_progress(ProgressEvent::Overall(100));
        on_progress(ProgressEvent::State(state));
        logger.log_completion(&format!("{} bytes from {} segment(s)", media.len(), total));

        Ok(RunOutput {
            run_id: logger.run_id().to_string(),
            media,
            segments: segments.iter().map(Segment::without_media).collect(),
            records,
        })
    }

    /// Submit, poll, download and commit one segment.
    async fn generate_segment(
        &self,
        slot: &mut Segment,
        request: &SegmentRequest,
        images: ReferenceImages,
        total: usize,
        on_progress: &ProgressCallback,
    ) -> PipelineResult<(Bytes, VideoMetadata)> {
        let index = slot.index;
        *slot = slot.clone().start();
        on_progress(ProgressEvent::Segment(slot.without_media()));

        self.ensure_not_cancelled()?;
        let submission = SubmitRequest::new(
            request.prompt.clone(),
            request.seconds,
            request.size,
            request.model.clone(),
        )
        .with_images(images);
        let job = self.provider.submit(&submission).await?;
        *slot = slot.clone().submitted(job.id.clone());
        on_progress(ProgressEvent::Segment(slot.without_media()));

        let snapshot = slot.without_media();
        let forward = Arc::clone(on_progress);
        let relay = move |p: u8| {
            forward(ProgressEvent::Segment(snapshot.clone().with_progress(p)));
            forward(ProgressEvent::Overall(generation_progress(index, total, p)));
        };
        let finished = self.poller().poll_until_complete(&job.id, &relay).await?;

        let clip = self.provider.fetch_content(&finished.id).await?;
        let now = Utc::now();
        *slot = slot.clone().complete(clip.clone(), now);
        on_progress(ProgressEvent::Segment(slot.without_media()));
        on_progress(ProgressEvent::Overall(generation_progress(index, total, 100)));

        let record = VideoMetadata::new(
            finished.id,
            format!("segment-{}-{}", index, now.timestamp_millis()),
            request.prompt.clone(),
            self.provider.config().kind(),
            GenerationParameters::from(request),
            now,
        );
        self.history.append(record.clone()).await?;
        record_segment("completed");

        Ok((clip, record))
    }

    /// Mark the segment failed, publish the failed state and attribute the error.
    fn abort(
        &self,
        logger: &RunLogger,
        state: RunState,
        slot: &mut Segment,
        error: PipelineError,
        on_progress: &ProgressCallback,
    ) -> PipelineError {
        let index = slot.index;
        // Completed segments fail too when their continuity frame breaks
        *slot = slot.clone().fail_after_completion(error.to_string());
        on_progress(ProgressEvent::Segment(slot.without_media()));
        record_segment("failed");

        let state = state.fail(error.to_string());
        on_progress(ProgressEvent::State(state));
        logger.log_error(&format!("Segment {} failed: {}", index, error));
        error.in_segment(index)
    }

    /// Resize a caller-supplied frame to the output size.
    async fn prepare_reference(
        &self,
        image: Option<&Bytes>,
        size: VideoSize,
    ) -> PipelineResult<Option<Bytes>> {
        let Some(image) = image else {
            return Ok(None);
        };
        match self.media.resize_image(image, size).await {
            Ok(resized) => Ok(Some(resized)),
            Err(e) if e.is_bad_input() => Err(PipelineError::validation(format!("reference image: {}", e))),
            Err(e) => Err(PipelineError::FrameExtraction(e)),
        }
    }
}

/// Reject requests a run cannot honor before anything is submitted.
///
/// Every segment must share size and model so the final join can stream-copy.
pub fn validate_segments(segments: &[SegmentRequest]) -> PipelineResult<()> {
    let first = segments
        .first()
        .ok_or_else(|| PipelineError::validation("at least one segment is required"))?;

    for (i, segment) in segments.iter().enumerate() {
        segment
            .check()
            .map_err(|e| PipelineError::validation(format!("segment {}: {}", i, e)))?;
        if segment.size != first.size {
            return Err(PipelineError::validation(format!(
                "segment {} size {} differs from {}",
                i, segment.size, first.size
            )));
        }
        if segment.model != first.model {
            return Err(PipelineError::validation(format!(
                "segment {} model '{}' differs from '{}'",
                i, segment.model, first.model
            )));
        }
    }
    Ok(())
}

/// Reference imagery for segment `index` of `total`.
///
/// Segment 0 opens on the caller's first frame; later segments open on the
/// frame carried from their predecessor, never on the caller's image.
/// Single-image providers get that opening frame as `input_reference`.
/// Dual-frame providers get it as `first_frame`, plus the caller's last frame
/// on the final segment only.
pub fn reference_images(
    dual_frames: bool,
    index: usize,
    total: usize,
    first_frame: Option<&Bytes>,
    last_frame: Option<&Bytes>,
    carried: Option<&Bytes>,
) -> ReferenceImages {
    let opening = if index == 0 { first_frame } else { carried };

    if dual_frames {
        ReferenceImages {
            input_reference: None,
            first_frame: opening.cloned(),
            last_frame: last_frame.filter(|_| index + 1 == total).cloned(),
        }
    } else {
        ReferenceImages {
            input_reference: opening.cloned(),
            ..Default::default()
        }
    }
}
