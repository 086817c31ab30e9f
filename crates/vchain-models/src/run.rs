//! Pipeline run state machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// State of one pipeline run.
///
/// `Idle -> Running(i) -> Succeeded | Failed(i, error)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running { segment_index: usize },
    /// All segments generated; assembling the final clip
    Assembling,
    Succeeded,
    Failed { segment_index: Option<usize>, error: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed { .. })
    }

    /// Move to running the given segment. Terminal states stay put.
    pub fn run_segment(self, segment_index: usize) -> Self {
        if self.is_terminal() {
            return self;
        }
        RunState::Running { segment_index }
    }

    pub fn assemble(self) -> Self {
        if self.is_terminal() {
            return self;
        }
        RunState::Assembling
    }

    pub fn succeed(self) -> Self {
        if self.is_terminal() {
            return self;
        }
        RunState::Succeeded
    }

    /// Fail the run, attributing the error to the segment being run.
    pub fn fail(self, error: impl Into<String>) -> Self {
        let segment_index = match &self {
            RunState::Running { segment_index } => Some(*segment_index),
            RunState::Succeeded | RunState::Failed { .. } => return self,
            _ => None,
        };
        RunState::Failed {
            segment_index,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_records_running_segment() {
        let state = RunState::Idle.run_segment(0).run_segment(1).fail("boom");
        assert_eq!(
            state,
            RunState::Failed {
                segment_index: Some(1),
                error: "boom".into()
            }
        );
        // Terminal
        assert_eq!(state.clone().run_segment(2), state);
    }

    #[test]
    fn test_assembly_failure_has_no_segment() {
        let state = RunState::Idle.run_segment(0).assemble().fail("concat");
        assert!(matches!(state, RunState::Failed { segment_index: None, .. }));
    }

    #[test]
    fn test_success_is_terminal() {
        let state = RunState::Idle.run_segment(0).assemble().succeed();
        assert!(state.is_terminal());
        assert_eq!(state.clone().fail("late"), state);
    }
}
