// src/ai_response.rs
use serde_json::Value;

use crate::content::{Stage, TagSelection};
use crate::error::AdvisorError;

/// Normalized stage-progress verdict from the Narrative Advisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorVerdict {
    /// Always within `[current_index, stage_count - 1]`.
    pub stage_index: usize,
    pub stage_number: u32,
    pub thought: String,
}

impl AdvisorVerdict {
    /// Verdict used whenever the advisor reply cannot be trusted: no progress and a
    /// generic nudge toward the current checkpoint.
    pub fn fallback(stage: &Stage, current_index: usize) -> Self {
        AdvisorVerdict {
            stage_index: current_index,
            stage_number: stage.number,
            thought: format!(
                "I need to focus on {} to progress further...",
                stage.checkpoint
            ),
        }
    }
}

/// Returns the first balanced `{ ... }` span of `raw`, skipping braces inside strings.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    // Unbalanced; fall back to the widest candidate span.
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

pub fn parse_advisor_response(
    raw: &str,
    stages: &[Stage],
    current_index: usize,
) -> Result<AdvisorVerdict, AdvisorError> {
    let last_index = stages
        .len()
        .checked_sub(1)
        .ok_or_else(|| AdvisorError::MalformedResponse("no stages to compare".to_string()))?;
    let current_index = current_index.min(last_index);

    let json_text = extract_json_object(raw).ok_or(AdvisorError::NoStructuredData)?;
    let json: Value = serde_json::from_str(json_text)?;

    let progress = json
        .get("stageProgress")
        .and_then(Value::as_f64)
        .ok_or_else(|| AdvisorError::MalformedResponse("stageProgress must be a number".into()))?;
    let thought = json
        .get("innerThought")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|thought| !thought.is_empty())
        .ok_or_else(|| {
            AdvisorError::MalformedResponse("innerThought must be a non-empty string".into())
        })?;

    // stageProgress names a stage number; resolve it to the furthest stage it covers.
    let suggested_index = stages
        .iter()
        .rposition(|stage| f64::from(stage.number) <= progress)
        .unwrap_or(current_index);
    let stage_index = suggested_index.clamp(current_index, last_index);

    Ok(AdvisorVerdict {
        stage_index,
        stage_number: stages[stage_index].number,
        thought: thought.to_string(),
    })
}

/// Like [`parse_advisor_response`], but never fails: any problem yields the fallback verdict.
pub fn normalize_advisor_response(
    raw: &str,
    stages: &[Stage],
    current_index: usize,
) -> AdvisorVerdict {
    match parse_advisor_response(raw, stages, current_index) {
        Ok(verdict) => verdict,
        Err(e) => {
            log::error!("[Advisor] Error processing LLM response: {e}");
            let fallback_stage = stages
                .get(current_index)
                .or_else(|| stages.last())
                .cloned()
                .unwrap_or_default();
            AdvisorVerdict::fallback(&fallback_stage, current_index)
        }
    }
}

/// Parses the advisor's tag choice: one tag (or "") per category.
pub fn parse_tag_selection(raw: &str) -> Result<TagSelection, AdvisorError> {
    let json_text = extract_json_object(raw).ok_or(AdvisorError::NoStructuredData)?;
    let json: Value = serde_json::from_str(json_text)?;
    let object = json
        .as_object()
        .ok_or_else(|| AdvisorError::MalformedResponse("tag selection must be an object".into()))?;

    Ok(object
        .iter()
        .filter_map(|(category, tag)| {
            tag.as_str()
                .map(|tag| (category.clone(), tag.trim().to_string()))
        })
        .collect())
}
