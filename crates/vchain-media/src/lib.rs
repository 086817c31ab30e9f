//! FFmpeg CLI wrapper for the generation pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeouts via tokio
//! - Last-frame extraction, stream-copy concatenation and image resizing
//!   behind the [`MediaBackend`] trait

pub mod command;
pub mod concat;
pub mod engine;
pub mod error;
pub mod frame;
pub mod probe;
pub mod progress;
pub mod resize;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::concat_manifest;
pub use engine::{MediaBackend, MediaEngine, MediaEngineConfig};
pub use error::{MediaError, MediaResult};
pub use frame::last_frame_timestamp;
pub use probe::{probe_video, VideoInfo};
pub use progress::{noop_percent, FfmpegProgress, PercentCallback};
pub use resize::resize_to;
