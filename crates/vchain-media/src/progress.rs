//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether FFmpeg reported `progress=end`
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// Callback receiving whole-number percentages (0-100).
pub type PercentCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Callback that ignores every update.
pub fn noop_percent() -> PercentCallback {
    Arc::new(|_| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(4000) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_complete_is_full() {
        let progress = FfmpegProgress {
            is_complete: true,
            ..Default::default()
        };
        assert_eq!(progress.percentage(0), 100.0);
    }
}
