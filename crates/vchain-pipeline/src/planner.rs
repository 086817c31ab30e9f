//! Segment planner.
//!
//! Turns one base prompt into `count` continuity-aware sub-prompts with a
//! single JSON-mode chat call. The model writes the narrative; timing always
//! comes from the caller.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vchain_models::{PlannedSegment, SegmentSeconds};
use vchain_provider::GenerationProvider;

use crate::error::{PlanningError, PlanningResult};

/// System instruction sent with every planning request.
pub const PLANNER_INSTRUCTIONS: &str = "\
You are a prompt director for a text-to-video model. Rewrite the base prompt \
as a sequence of shot prompts that play back to back as one continuous clip.

Rules:
1) Respond with JSON only, shaped exactly as:
   {\"segments\": [{\"title\": \"Generation 1\", \"seconds\": <int>, \"prompt\": \"<prompt>\"}]}
2) Continuity:
   - Segment 1 is self-contained and establishes subject, setting and style.
   - Segment k > 1 begins from the final frame of segment k-1.
   - Keep subjects, lighting and visual style consistent between segments.
3) Prompts are concrete and cinematic: name the subject, action, camera and light.";

/// Raw planner entry. Every field is optional so shape errors surface as
/// planning errors rather than serde noise.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSegment {
    title: Option<String>,
    prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    segments: Option<serde_json::Value>,
}

/// Plans multi-segment prompts against the configured provider.
#[derive(Clone)]
pub struct SegmentPlanner {
    provider: Arc<dyn GenerationProvider>,
}

impl SegmentPlanner {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    /// Plan `count` segments of `seconds` each from `base_prompt`.
    ///
    /// Returns exactly `count` entries or an error. Nothing is persisted.
    pub async fn plan(
        &self,
        base_prompt: &str,
        seconds: SegmentSeconds,
        count: usize,
    ) -> PlanningResult<Vec<PlannedSegment>> {
        let base_prompt = base_prompt.trim();
        if base_prompt.is_empty() {
            return Err(PlanningError::validation("base prompt must not be empty"));
        }
        if count == 0 {
            return Err(PlanningError::validation("segment count must be at least 1"));
        }

        info!(count, seconds = seconds.as_secs(), "Planning segments");
        let content = self
            .provider
            .complete_chat(PLANNER_INSTRUCTIONS, &planner_input(base_prompt, seconds, count))
            .await?;
        debug!(bytes = content.len(), "Planner replied");

        let plan = parse_plan(&content, seconds, count);
        if let Err(e) = &plan {
            warn!("Planner output rejected: {}", e);
        }
        plan
    }
}

/// User message for a planning request.
pub fn planner_input(base_prompt: &str, seconds: SegmentSeconds, count: usize) -> String {
    format!(
        "BASE PROMPT: {}\n\nGENERATION LENGTH (seconds): {}\nTOTAL GENERATIONS: {}\n\nReturn exactly {} segments in JSON format.",
        base_prompt,
        seconds.as_secs(),
        count,
        count
    )
}

/// Validate planner output and pin every entry to `seconds`.
pub fn parse_plan(content: &str, seconds: SegmentSeconds, count: usize) -> PlanningResult<Vec<PlannedSegment>> {
    let body = strip_code_fence(content);
    let raw: RawPlan = if body.is_empty() {
        RawPlan::default()
    } else {
        serde_json::from_str(body).map_err(|e| PlanningError::malformed(format!("invalid JSON: {}", e)))?
    };

    let entries = match raw.segments {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => return Err(PlanningError::malformed("'segments' is not an array")),
    };

    if entries.len() != count {
        return Err(PlanningError::CountMismatch {
            expected: count,
            actual: entries.len(),
        });
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let entry: RawSegment = serde_json::from_value(value)
                .map_err(|e| PlanningError::malformed(format!("segment {}: {}", i + 1, e)))?;
            let prompt = entry
                .prompt
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .ok_or_else(|| PlanningError::malformed(format!("segment {} has no prompt", i + 1)))?;
            let title = entry
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Generation {}", i + 1));
            Ok(PlannedSegment::new(title, seconds, prompt))
        })
        .collect()
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
