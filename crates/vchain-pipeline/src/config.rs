//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;
use vchain_models::VideoSize;

use crate::poller::PollPolicy;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How job status is polled
    pub poll: PollPolicy,
    /// Parent directory for media scratch directories
    pub scratch_dir: PathBuf,
    /// Per-invocation FFmpeg timeout
    pub ffmpeg_timeout: Duration,
    /// Model used when a request names none
    pub default_model: String,
    /// Output size used when a request names none
    pub default_size: VideoSize,
    /// JSON history file used by the CLI
    pub history_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            scratch_dir: std::env::temp_dir(),
            ffmpeg_timeout: Duration::from_secs(600),
            default_model: "sora-2".to_string(),
            default_size: VideoSize::default(),
            history_path: PathBuf::from("vchain-history.json"),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll: PollPolicy {
                interval: Duration::from_millis(
                    std::env::var("VCHAIN_POLL_INTERVAL_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(2000),
                ),
                max_attempts: std::env::var("VCHAIN_POLL_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok()),
                deadline: std::env::var("VCHAIN_POLL_DEADLINE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs),
            },
            scratch_dir: std::env::var("VCHAIN_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("VCHAIN_FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            default_model: std::env::var("VCHAIN_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            default_size: std::env::var("VCHAIN_DEFAULT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_size),
            history_path: std::env::var("VCHAIN_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_path),
        }
    }

    /// Media engine settings derived from this config.
    pub fn media_config(&self) -> vchain_media::MediaEngineConfig {
        vchain_media::MediaEngineConfig {
            scratch_dir: self.scratch_dir.clone(),
            ffmpeg_timeout_secs: Some(self.ffmpeg_timeout.as_secs()).filter(|s| *s > 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_unbounded_two_second_loop() {
        let config = PipelineConfig::default();
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert!(config.poll.max_attempts.is_none());
        assert!(config.poll.deadline.is_none());
        assert_eq!(config.default_size.to_string(), "1280x720");
        assert_eq!(config.media_config().ffmpeg_timeout_secs, Some(600));
    }
}
