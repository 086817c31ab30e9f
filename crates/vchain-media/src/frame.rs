//! Last-frame extraction.
//!
//! The frame is taken a hair before the end of the clip because seeking to
//! the exact container duration often lands past the last decodable frame.

use std::path::Path;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video_with;

/// Seconds before the end of the clip at which the frame is sampled.
pub const END_OFFSET_SECS: f64 = 0.1;

/// `-q:v` value used for extracted frames (2 is the highest JPEG quality).
pub const FRAME_JPEG_QUALITY: u8 = 2;

/// Timestamp of the frame to extract for a clip of `duration` seconds.
pub fn last_frame_timestamp(duration: f64) -> f64 {
    (duration - END_OFFSET_SECS).max(0.0)
}

/// Extract the last frame of `video_path` into `output_path` as JPEG.
pub async fn extract_last_frame_to(
    runner: &FfmpegRunner,
    ffprobe: &Path,
    video_path: &Path,
    output_path: &Path,
) -> MediaResult<()> {
    let info = probe_video_with(ffprobe, video_path).await?;
    if info.duration <= 0.0 {
        return Err(MediaError::ZeroDuration);
    }

    let at = last_frame_timestamp(info.duration);
    debug!(duration = info.duration, at, "Extracting last frame");

    let cmd = FfmpegCommand::new(video_path, output_path)
        .seek(at)
        .single_frame()
        .image_quality(FRAME_JPEG_QUALITY);

    runner.run(&cmd).await?;

    match tokio::fs::metadata(output_path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MediaError::invalid_video(format!(
            "no frame could be decoded at {:.3}s",
            at
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_frame_timestamp() {
        assert!((last_frame_timestamp(8.0) - 7.9).abs() < 1e-9);
        assert_eq!(last_frame_timestamp(0.05), 0.0);
        assert_eq!(last_frame_timestamp(0.0), 0.0);
    }
}
