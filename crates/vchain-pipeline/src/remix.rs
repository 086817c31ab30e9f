//! Remix workflow.
//!
//! A remix is a one-segment run that references a prior job and inherits
//! its duration, size and model. It is only allowed inside the parent's
//! 24-hour window; an expired parent is rejected before any network call.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;
use vchain_models::{RunState, VideoMetadata};
use vchain_provider::SubmitRequest;

use crate::error::{HistoryError, PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::metrics::record_run;
use crate::orchestrator::Pipeline;
use crate::progress::{ProgressCallback, ProgressEvent};

/// Result of a successful remix.
#[derive(Debug, Clone)]
pub struct RemixOutput {
    pub run_id: String,
    pub media: Bytes,
    /// History record of the remix
    pub record: VideoMetadata,
    /// Parent's remix count after this remix
    pub parent_remix_count: u32,
}

/// Reject a remix of `parent` if its window has closed at `now`.
pub fn ensure_remixable(parent: &VideoMetadata, now: DateTime<Utc>) -> PipelineResult<()> {
    if parent.is_expired_at(now) {
        return Err(PipelineError::Expired {
            job_id: parent.job_id.clone(),
            expired_at: VideoMetadata::expiry_for(parent.created_at),
        });
    }
    Ok(())
}

impl Pipeline {
    /// Remix `parent` with `new_prompt`.
    pub async fn remix(
        &self,
        parent: &VideoMetadata,
        new_prompt: &str,
        on_progress: ProgressCallback,
    ) -> PipelineResult<RemixOutput> {
        self.remix_at(parent, new_prompt, Utc::now(), on_progress).await
    }

    /// Remix `parent`, judging expiry at `now`.
    pub async fn remix_at(
        &self,
        parent: &VideoMetadata,
        new_prompt: &str,
        now: DateTime<Utc>,
        on_progress: ProgressCallback,
    ) -> PipelineResult<RemixOutput> {
        ensure_remixable(parent, now)?;

        let run_id = Uuid::new_v4().to_string();
        let logger = RunLogger::new(&run_id, "remix");
        let span = logger.create_span();
        let started = Instant::now();

        let result = self
            .run_remix(&logger, parent, new_prompt, now, &on_progress)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            logger.log_error(&e.to_string());
            on_progress(ProgressEvent::State(RunState::Running { segment_index: 0 }.fail(e.to_string())));
        }
        record_run("remix", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn run_remix(
        &self,
        logger: &RunLogger,
        parent: &VideoMetadata,
        new_prompt: &str,
        now: DateTime<Utc>,
        on_progress: &ProgressCallback,
    ) -> PipelineResult<RemixOutput> {
        let prompt = new_prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::validation("remix prompt must not be empty"));
        }

        let kind = self.provider.config().kind();
        if parent.provider != kind {
            return Err(PipelineError::validation(format!(
                "video {} was generated by the {} provider, not {}",
                parent.job_id, parent.provider, kind
            )));
        }

        // History is authoritative for the parent's age and parameters
        let stored = self
            .history
            .get(&parent.job_id, now)
            .await?
            .ok_or_else(|| HistoryError::UnknownParent(parent.job_id.clone()))?;
        ensure_remixable(&stored, now)?;
        self.ensure_not_cancelled()?;

        logger.log_start(&format!("Remixing {}", stored.job_id));
        on_progress(ProgressEvent::State(RunState::Idle.run_segment(0)));
        on_progress(ProgressEvent::Overall(0));

        let params = &stored.parameters;
        let submission = SubmitRequest::new(prompt, params.seconds, params.size, params.model.clone())
            .remix_of(stored.job_id.clone());
        let job = self.provider.submit(&submission).await?;
        logger.log_progress(&format!("Remix job {} submitted", job.id));

        let forward = Arc::clone(on_progress);
        // A remix is a single job, so its progress is the run's progress
        let relay = move |p: u8| forward(ProgressEvent::Overall(p.min(100)));
        let finished = self.poller().poll_until_complete(&job.id, &relay).await?;

        let media = self.provider.fetch_content(&finished.id).await?;
        let completed_at = Utc::now();
        let record = VideoMetadata::remix_of(
            &stored,
            finished.id,
            format!("remix-{}", completed_at.timestamp_millis()),
            prompt,
            completed_at,
        );
        self.history.append(record.clone()).await?;
        let parent_remix_count = self.history.increment_remix_count(&stored.job_id).await?;

        on_progress(ProgressEvent::Overall(100));
        on_progress(ProgressEvent::State(RunState::Idle.run_segment(0).succeed()));
        logger.log_completion(&format!(
            "Remix {} of {} ({} remixes so far)",
            record.job_id, stored.job_id, parent_remix_count
        ));

        Ok(RemixOutput {
            run_id: logger.run_id().to_string(),
            media,
            record,
            parent_remix_count,
        })
    }
}
