//! Video generation pipeline.
//!
//! Plans a base prompt into segments, generates them in order with frame
//! continuity, records history, and joins the results into one clip.
//!
//! Segments depend on their predecessor's last frame, so a run never
//! generates two segments concurrently.

pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod poller;
pub mod progress;
pub mod remix;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::{HistoryError, HistoryResult, PipelineError, PipelineResult, PlanningError, PlanningResult};
pub use history::{FileHistory, HistoryStore, InMemoryHistory};
pub use logging::RunLogger;
pub use orchestrator::{reference_images, validate_segments, Pipeline, RunOutput, RunRequest};
pub use planner::SegmentPlanner;
pub use poller::{JobPoller, PollPolicy};
pub use progress::{silent, ProgressCallback, ProgressEvent};
pub use remix::{ensure_remixable, RemixOutput};
