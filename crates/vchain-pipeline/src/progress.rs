//! Progress reporting for pipeline runs.
//!
//! The orchestrator emits [`ProgressEvent`]s through a callback so callers
//! can forward them to a UI, a log, or a channel without the pipeline
//! knowing about the transport.

use std::sync::Arc;
use vchain_models::{RunState, Segment};

/// Progress event emitted during a run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The run moved to a new state
    State(RunState),

    /// A segment changed (media is never attached)
    Segment(Segment),

    /// Overall progress (0-100)
    Overall(u8),

    /// An advisory message, e.g. a memory warning
    Notice(String),
}

/// Progress callback type.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Callback that drops every event.
pub fn silent() -> ProgressCallback {
    Arc::new(|_| {})
}
