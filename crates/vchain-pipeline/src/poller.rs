//! Job poller.
//!
//! Drives one provider job to a terminal state, relaying whatever progress
//! the provider reports. The default policy polls every two seconds with no
//! ceiling; callers that need one set `max_attempts`, `deadline`, or a cancel
//! signal.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};
use vchain_models::{GenerationJob, JobId, JobStatus};
use vchain_provider::GenerationProvider;

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_poll;

/// Status polling bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between status reads
    pub interval: Duration,
    /// Give up after this many status reads
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since polling began
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: None,
            deadline: None,
        }
    }
}

impl PollPolicy {
    /// Whether another read is allowed after `attempts` reads and `elapsed` time.
    fn allows(&self, attempts: u32, elapsed: Duration) -> bool {
        let under_attempts = self.max_attempts.map_or(true, |max| attempts < max);
        let under_deadline = self
            .deadline
            .map_or(true, |deadline| elapsed + self.interval <= deadline);
        under_attempts && under_deadline
    }
}

/// Polls a provider job until it completes or fails.
#[derive(Clone)]
pub struct JobPoller {
    provider: Arc<dyn GenerationProvider>,
    policy: PollPolicy,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl JobPoller {
    pub fn new(provider: Arc<dyn GenerationProvider>, policy: PollPolicy) -> Self {
        Self {
            provider,
            policy,
            cancel_rx: None,
        }
    }

    /// Stop polling when `cancel_rx` flips to true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Poll `job_id` until it reaches a terminal status.
    ///
    /// `on_progress` receives every progress value the provider reports,
    /// unmodified. A `Failed` job surfaces as [`PipelineError::GenerationFailed`].
    pub async fn poll_until_complete(
        &self,
        job_id: &JobId,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> PipelineResult<GenerationJob> {
        let started = Instant::now();
        let mut job = GenerationJob::queued(job_id.clone());
        let mut attempts: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let mut latest = self.provider.status(job_id).await?;
            attempts += 1;
            record_poll();

            // The read answers for the id we asked about
            if latest.id != *job_id {
                warn!(job_id = %job_id, reported = %latest.id, "Status read carries a different job id");
                latest.id = job_id.clone();
            }

            job = job.advance(latest);
            if let Some(progress) = job.progress {
                on_progress(progress);
            }

            match job.status {
                JobStatus::Completed => {
                    debug!(job_id = %job_id, attempts, "Job completed");
                    return Ok(job);
                }
                JobStatus::Failed => {
                    let message = job.failure_message();
                    warn!(job_id = %job_id, attempts, "Job failed: {}", message);
                    return Err(PipelineError::GenerationFailed {
                        job_id: job_id.clone(),
                        message,
                    });
                }
                JobStatus::Queued | JobStatus::InProgress => {}
            }

            if !self.policy.allows(attempts, started.elapsed()) {
                warn!(job_id = %job_id, attempts, "Giving up on job");
                return Err(PipelineError::PollTimeout {
                    job_id: job_id.clone(),
                    attempts,
                });
            }

            self.sleep().await?;
        }
    }

    /// Sleep one interval, waking early on cancellation.
    async fn sleep(&self) -> PipelineResult<()> {
        let Some(mut rx) = self.cancel_rx.clone() else {
            tokio::time::sleep(self.policy.interval).await;
            return Ok(());
        };

        let sleep = tokio::time::sleep(self.policy.interval);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender gone; nobody can cancel any more
                        sleep.as_mut().await;
                        return Ok(());
                    }
                    if *rx.borrow() {
                        return Err(PipelineError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;
    use std::sync::Mutex;

    fn fast() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_relays_progress_until_completed() {
        let provider = Arc::new(FakeProvider::new());
        provider.script_status(
            "job-1",
            vec![
                (JobStatus::Queued, None),
                (JobStatus::InProgress, Some(30)),
                (JobStatus::InProgress, Some(20)),
                (JobStatus::Completed, Some(100)),
            ],
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let poller = JobPoller::new(provider.clone(), fast());
        let job = poller
            .poll_until_complete(&JobId::from("job-1"), &move |p| sink.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        // Values are relayed as read, without enforcing monotonicity
        assert_eq!(*seen.lock().unwrap(), vec![30, 20, 100]);
        assert_eq!(provider.status_calls(), 4);
    }

    #[tokio::test]
    async fn test_failed_job_raises_generation_failed() {
        let provider = Arc::new(FakeProvider::new());
        provider.script_status("job-1", vec![(JobStatus::InProgress, Some(10)), (JobStatus::Failed, None)]);

        let err = JobPoller::new(provider, fast())
            .poll_until_complete(&JobId::from("job-1"), &|_| {})
            .await
            .unwrap_err();
        match err {
            PipelineError::GenerationFailed { job_id, message } => {
                assert_eq!(job_id.as_str(), "job-1");
                assert_eq!(message, "Video generation failed");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_with_different_id_still_completes() {
        let provider = Arc::new(FakeProvider::new());
        provider.rename_status_ids("gen-");
        provider.script_status("job-1", vec![(JobStatus::InProgress, Some(40)), (JobStatus::Completed, Some(100))]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let policy = PollPolicy {
            max_attempts: Some(5),
            ..fast()
        };
        let job = JobPoller::new(provider.clone(), policy)
            .poll_until_complete(&JobId::from("job-1"), &move |p| sink.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.id.as_str(), "job-1");
        assert_eq!(*seen.lock().unwrap(), vec![40, 100]);
        assert_eq!(provider.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_max_attempts_bounds_the_loop() {
        let provider = Arc::new(FakeProvider::new());
        provider.script_status("job-1", vec![(JobStatus::InProgress, Some(1))]);

        let policy = PollPolicy {
            max_attempts: Some(3),
            ..fast()
        };
        let err = JobPoller::new(provider.clone(), policy)
            .poll_until_complete(&JobId::from("job-1"), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PollTimeout { attempts: 3, .. }));
        assert_eq!(provider.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let provider = Arc::new(FakeProvider::new());
        provider.script_status("job-1", vec![(JobStatus::InProgress, None)]);

        let (tx, rx) = watch::channel(false);
        let poller = JobPoller::new(
            provider,
            PollPolicy {
                interval: Duration::from_secs(60),
                ..Default::default()
            },
        )
        .with_cancel(rx);

        let handle = tokio::spawn(async move {
            poller.poll_until_complete(&JobId::from("job-1"), &|_| {}).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_policy_deadline() {
        let policy = PollPolicy {
            interval: Duration::from_secs(2),
            max_attempts: None,
            deadline: Some(Duration::from_secs(5)),
        };
        assert!(policy.allows(1, Duration::from_secs(3)));
        assert!(!policy.allows(2, Duration::from_secs(4)));
    }
}
