//! Stage progression: the current-stage pointer, advance rules, transitions and the
//! guidance / inner-thought decision table.

use crate::ai_response::AdvisorVerdict;
use crate::content::Stage;
use crate::error::StageError;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    Count,
    Llm,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceDecision {
    pub advance: bool,
    pub reason: AdvanceReason,
}

/// Who asked for a guidance or thought message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThoughtMode {
    /// Triggered by the message pipeline; obeys the session toggles.
    #[default]
    Automatic,
    /// Explicit request for an inner thought.
    Thought,
    /// Explicit request for the guidance block, without a thought.
    Guidance,
}

#[derive(Debug, Clone)]
pub struct StageEngine {
    stages: Vec<Stage>,
    current_index: usize,
}

impl StageEngine {
    /// `stages` must be non-empty and ordered by strictly increasing number, which
    /// `content::parse_stages` guarantees.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            current_index: 0,
        }
    }

    /// Builds an engine positioned at `stage_number`, or at the first stage when the
    /// number is unknown.
    pub fn starting_at(stages: Vec<Stage>, stage_number: u32) -> Self {
        let mut engine = Self::new(stages);
        engine.current_index = engine.index_of(stage_number).unwrap_or(0);
        engine
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_first(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 >= self.stages.len()
    }

    pub fn index_of(&self, stage_number: u32) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.number == stage_number)
    }

    pub fn current_stage(&self) -> Result<&Stage, StageError> {
        self.stages
            .get(self.current_index)
            .ok_or(StageError::OutOfRange {
                index: self.current_index,
                len: self.stages.len(),
            })
    }

    pub fn evaluate_advance(
        &self,
        user_message_count: u32,
        suggestion: Option<&AdvisorVerdict>,
    ) -> Result<AdvanceDecision, StageError> {
        let current = self.current_stage()?;

        let by_count = user_message_count >= current.messages_threshold();
        let by_llm = suggestion.is_some_and(|verdict| verdict.stage_number > current.number);

        let reason = if by_count {
            AdvanceReason::Count
        } else if by_llm {
            AdvanceReason::Llm
        } else {
            AdvanceReason::None
        };

        Ok(AdvanceDecision {
            advance: by_count || by_llm,
            reason,
        })
    }

    /// Moves one stage forward. A no-op at the last stage.
    pub fn advance(&mut self) -> usize {
        if self.current_index + 1 < self.stages.len() {
            self.current_index += 1;
            log::info!(
                "[Stage] Moved to next stage. Current stage index: {}",
                self.current_index
            );
        } else {
            log::info!("[Stage] Already at the last stage. No action taken.");
        }
        self.current_index
    }

    /// Moves one stage back. A no-op at the first stage.
    pub fn retreat(&mut self) -> usize {
        if self.current_index > 0 {
            self.current_index -= 1;
            log::info!(
                "[Stage] Moved to previous stage. Current stage index: {}",
                self.current_index
            );
        } else {
            log::info!("[Stage] Already at the first stage. No action taken.");
        }
        self.current_index
    }

    /// Records a stage change in the session and resets per-stage state.
    pub fn apply_transition(&self, state: &mut SessionState, new_stage_number: u32) {
        log::info!("[Stage] Updating stage to {new_stage_number}");
        state.previous_stage_number = state.current_stage_number;
        state.current_stage_number = new_stage_number;
        state.current_stage_index = self.current_index;
        state.current_image = None;
        state.clear_image_flags();
        state.user_message_counter = 0;
    }
}

/// Formats a stage's strategy and profile fields into one advisory block.
pub fn build_guidance_text(stage: &Stage, character_name: &str) -> String {
    let ability_usage: String = stage
        .ability_usage
        .iter()
        .map(|(ability, usage)| format!("  - {ability}: {usage}\n"))
        .collect();

    format!(
        r#"{name}'S STRATEGIC GUIDANCE:
- You are currently at stage {number}: "{stage_name}"
- Your next checkpoint is: {checkpoint}

SUMMARY:
- {summary}

STRATEGIC FOCUS:
- Focus: {focus}
- Action Plan: {action_plan}
- Overcome Resistance By: {overcome}
- Reaction to Resistance: {reaction}

CHARACTER PROFILE:
- Personality Traits: {traits}
- Sadism Level: {sadism}
- Physical Form: {form}
- Fetish Focus: {fetish}
- Psychological Tactics: {tactics}

ABILITIES:
- Abilities: {abilities}
- Ability Usage:
{ability_usage}
GUIDANCE:
- Consider the inner thought above when crafting your response.
- Ensure your next message subtly works toward achieving this checkpoint.
- Maintain natural conversation flow while implementing the strategy."#,
        name = character_name.to_uppercase(),
        number = stage.number,
        stage_name = stage.name,
        checkpoint = stage.checkpoint,
        summary = stage.summary,
        focus = stage.focus,
        action_plan = stage.action_plan,
        overcome = stage.overcome_resistance_by,
        reaction = stage.reaction_to_resistance,
        traits = stage.personality_traits.join(", "),
        sadism = stage.sadism_level,
        form = stage.physical_form,
        fetish = stage.fetish_focus,
        tactics = stage.psychological_tactics,
        abilities = stage.abilities.join(", "),
    )
}

pub fn thought_line(character_name: &str, thought: &str) -> String {
    format!(
        "{}'S INNER THOUGHT: {}",
        character_name.to_uppercase(),
        thought
    )
}

/// Decides which hidden system message, if any, follows an advisor round.
///
/// Posting the full guidance block marks the stage change as seen.
pub fn select_guidance_or_thought(
    state: &mut SessionState,
    stage: &Stage,
    character_name: &str,
    mode: ThoughtMode,
    thought: Option<&str>,
) -> Option<String> {
    let thought = thought.unwrap_or_default();

    if (state.stage_just_changed() && state.system_guidance) || mode == ThoughtMode::Guidance {
        let guidance = build_guidance_text(stage, character_name);
        state.previous_stage_number = state.current_stage_number;
        if mode == ThoughtMode::Guidance {
            Some(guidance)
        } else {
            Some(format!(
                "{}\n\n{}",
                thought_line(character_name, thought),
                guidance
            ))
        }
    } else if state.dynamic_thought || mode == ThoughtMode::Thought {
        Some(thought_line(character_name, thought))
    } else {
        None
    }
}
