//! Media engine: the single entry point the pipeline uses for media work.
//!
//! The engine resolves `ffmpeg`/`ffprobe` once at construction, serializes
//! concatenations behind a lock, and gives every operation its own scratch
//! directory that is removed on success, failure and cancellation alike.

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, histogram};
use std::path::PathBuf;
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use vchain_models::VideoSize;

use crate::command::{check_ffmpeg, check_ffprobe, FfmpegRunner};
use crate::concat::{concatenate_in_dir, input_name};
use crate::error::{MediaError, MediaResult};
use crate::frame::extract_last_frame_to;
use crate::progress::PercentCallback;
use crate::resize::resize_to;

/// Media operations needed by the generation pipeline.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Decode the last frame of an encoded video as a JPEG still.
    async fn extract_last_frame(&self, video: &Bytes) -> MediaResult<Bytes>;

    /// Join encoded videos in order without re-encoding.
    async fn concatenate(&self, videos: &[Bytes], on_progress: PercentCallback) -> MediaResult<Bytes>;

    /// Resize an encoded image to the target video dimensions.
    async fn resize_image(&self, image: &Bytes, size: VideoSize) -> MediaResult<Bytes>;
}

/// Media engine settings.
#[derive(Debug, Clone)]
pub struct MediaEngineConfig {
    /// Parent directory for per-operation scratch directories
    pub scratch_dir: PathBuf,
    /// Per-invocation FFmpeg timeout
    pub ffmpeg_timeout_secs: Option<u64>,
}

impl Default for MediaEngineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            ffmpeg_timeout_secs: Some(600),
        }
    }
}

/// FFmpeg-backed [`MediaBackend`].
pub struct MediaEngine {
    config: MediaEngineConfig,
    ffprobe: PathBuf,
    runner: FfmpegRunner,
    concat_lock: Mutex<()>,
}

impl MediaEngine {
    /// Resolve the FFmpeg tools and prepare the scratch root.
    pub fn new(config: MediaEngineConfig) -> MediaResult<Self> {
        let ffmpeg = check_ffmpeg()?;
        let ffprobe = check_ffprobe()?;
        std::fs::create_dir_all(&config.scratch_dir)?;

        info!(
            ffmpeg = %ffmpeg.display(),
            scratch_dir = %config.scratch_dir.display(),
            "Media engine ready"
        );

        let mut runner = FfmpegRunner::new().with_binary(ffmpeg);
        if let Some(secs) = config.ffmpeg_timeout_secs {
            runner = runner.with_timeout(secs);
        }

        Ok(Self {
            config,
            ffprobe,
            runner,
            concat_lock: Mutex::new(()),
        })
    }

    /// Abort in-flight FFmpeg work when `cancel_rx` flips to true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.runner = self.runner.with_cancel(cancel_rx);
        self
    }

    fn scratch(&self, prefix: &str) -> MediaResult<TempDir> {
        Ok(tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.config.scratch_dir)?)
    }
}

/// Remove a scratch directory, logging instead of failing.
fn cleanup(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        warn!("Failed to remove scratch directory {}: {}", path.display(), e);
    }
}

#[async_trait]
impl MediaBackend for MediaEngine {
    async fn extract_last_frame(&self, video: &Bytes) -> MediaResult<Bytes> {
        if video.is_empty() {
            return Err(MediaError::EmptyInput);
        }

        let start = Instant::now();
        let dir = self.scratch("vchain-frame-")?;
        let input = dir.path().join("input.mp4");
        let output = dir.path().join("last_frame.jpg");

        let result = async {
            tokio::fs::write(&input, video).await?;
            extract_last_frame_to(&self.runner, &self.ffprobe, &input, &output).await?;
            Ok::<_, MediaError>(Bytes::from(tokio::fs::read(&output).await?))
        }
        .await;

        cleanup(dir);

        let outcome = if result.is_ok() { "success" } else { "error" };
        counter!("vchain_frame_extractions_total", "outcome" => outcome).increment(1);
        histogram!("vchain_frame_extraction_seconds").record(start.elapsed().as_secs_f64());

        result
    }

    async fn concatenate(&self, videos: &[Bytes], on_progress: PercentCallback) -> MediaResult<Bytes> {
        match videos {
            [] => return Err(MediaError::EmptyInput),
            [only] => {
                on_progress(100);
                return Ok(only.clone());
            }
            _ => {}
        }
        if videos.iter().any(|v| v.is_empty()) {
            return Err(MediaError::EmptyInput);
        }

        let _guard = self.concat_lock.lock().await;
        let start = Instant::now();
        let dir = self.scratch("vchain-concat-")?;
        debug!(inputs = videos.len(), dir = %dir.path().display(), "Concatenating");

        let result = async {
            for (i, video) in videos.iter().enumerate() {
                tokio::fs::write(dir.path().join(input_name(i)), video).await?;
            }
            let output = concatenate_in_dir(
                &self.runner,
                &self.ffprobe,
                dir.path(),
                videos.len(),
                on_progress,
            )
            .await?;
            Ok::<_, MediaError>(Bytes::from(tokio::fs::read(&output).await?))
        }
        .await;

        cleanup(dir);

        let outcome = if result.is_ok() { "success" } else { "error" };
        counter!("vchain_concatenations_total", "outcome" => outcome).increment(1);
        histogram!("vchain_concatenation_seconds").record(start.elapsed().as_secs_f64());

        if let Ok(joined) = &result {
            info!(
                inputs = videos.len(),
                bytes = joined.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Concatenation complete"
            );
        }

        result
    }

    async fn resize_image(&self, image: &Bytes, size: VideoSize) -> MediaResult<Bytes> {
        let image = image.clone();
        tokio::task::spawn_blocking(move || resize_to(&image, size))
            .await
            .map_err(|e| MediaError::internal(format!("resize task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::noop_percent;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    fn engine(dir: &std::path::Path) -> Option<MediaEngine> {
        MediaEngine::new(MediaEngineConfig {
            scratch_dir: dir.to_path_buf(),
            ffmpeg_timeout_secs: Some(60),
        })
        .ok()
    }

    fn scratch_entries(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    /// Render a short test clip with FFmpeg's lavfi source.
    async fn test_clip(dir: &std::path::Path, name: &str, seconds: u32) -> Bytes {
        let path = dir.join(name);
        let status = tokio::process::Command::new("ffmpeg")
            .args([
                "-y", "-v", "error", "-f", "lavfi", "-i",
                &format!("testsrc=size=160x90:rate=10:duration={}", seconds),
                "-pix_fmt", "yuv420p", "-c:v", "mpeg4",
            ])
            .arg(&path)
            .status()
            .await
            .unwrap();
        assert!(status.success());
        Bytes::from(std::fs::read(&path).unwrap())
    }

    #[tokio::test]
    async fn test_single_input_returned_unchanged() {
        let root = tempfile::tempdir().unwrap();
        let Some(engine) = engine(root.path()) else {
            eprintln!("Skipping: ffmpeg not available");
            return;
        };
        let only = Bytes::from_static(b"not even a video");
        let seen = Arc::new(AtomicU8::new(0));
        let report = Arc::clone(&seen);
        let out = engine
            .concatenate(&[only.clone()], Arc::new(move |p| report.store(p, Ordering::SeqCst)))
            .await
            .unwrap();
        assert_eq!(out, only);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let root = tempfile::tempdir().unwrap();
        let Some(engine) = engine(root.path()) else {
            eprintln!("Skipping: ffmpeg not available");
            return;
        };
        assert!(matches!(
            engine.concatenate(&[], noop_percent()).await,
            Err(MediaError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_concatenate_and_extract() {
        let root = tempfile::tempdir().unwrap();
        let Some(engine) = engine(root.path()) else {
            eprintln!("Skipping: ffmpeg not available");
            return;
        };
        let clips = tempfile::tempdir().unwrap();
        let a = test_clip(clips.path(), "a.mp4", 1).await;
        let b = test_clip(clips.path(), "b.mp4", 1).await;

        let joined = engine.concatenate(&[a.clone(), b], noop_percent()).await.unwrap();
        assert!(joined.len() > a.len());

        let frame = engine.extract_last_frame(&joined).await.unwrap();
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);

        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_corrupt_input_cleans_scratch() {
        let root = tempfile::tempdir().unwrap();
        let Some(engine) = engine(root.path()) else {
            eprintln!("Skipping: ffmpeg not available");
            return;
        };
        let garbage = Bytes::from_static(b"garbage bytes");
        let result = engine
            .concatenate(&[garbage.clone(), garbage.clone()], noop_percent())
            .await;
        assert!(result.is_err());
        assert!(engine.extract_last_frame(&garbage).await.is_err());
        assert_eq!(scratch_entries(root.path()), 0);
    }
}
