//! Shared data models for the vchain generation pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Provider configuration (hosted vs self-hosted addressing)
//! - Generation jobs and their normalized lifecycle
//! - Segments, planned segments and segment requests
//! - Persisted history records with the 24h remix window
//! - Progress band math shared by the orchestrator and UIs

pub mod error;
pub mod job;
pub mod metadata;
pub mod plan;
pub mod progress;
pub mod provider;
pub mod run;
pub mod segment;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{GenerationJob, JobId, JobStatus};
pub use metadata::{is_video_expired, GenerationParameters, VideoMetadata, REMIX_WINDOW_HOURS};
pub use plan::PlannedSegment;
pub use provider::{ApiVariant, DeploymentNames, ProviderConfig, ProviderKind, SelfHostedConfig};
pub use run::RunState;
pub use segment::{Segment, SegmentRequest, SegmentSeconds, SegmentStatus, VideoSize};
