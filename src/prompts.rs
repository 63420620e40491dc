// Prompt builders for the Narrative Advisor.
use crate::content::{Replacements, Stage, TagCatalog};

/// Stage-progress analysis: asks for `stageProgress` and `innerThought` as JSON.
pub fn thought_system_instruction(
    stages: &[Stage],
    current_index: usize,
    names: &Replacements,
) -> String {
    let Some(current) = stages.get(current_index) else {
        return String::new();
    };
    let character = &names.character;
    let user = &names.user;

    let stage_data: String = stages
        .iter()
        .filter(|stage| stage.number >= current.number)
        .map(|stage| {
            if stage.number == current.number {
                format!(
                    "Stage {} - {} (Current Stage):\n* Summary: {}\n* Checkpoint: {}\n* Focus: {}\n* Action Plan: {}\n",
                    stage.number,
                    stage.name,
                    stage.summary,
                    stage.checkpoint,
                    stage.focus,
                    stage.action_plan
                )
            } else {
                format!(
                    "Stage {} - {}:\n* Summary: {}\n* Checkpoint: {}\n",
                    stage.number, stage.name, stage.summary, stage.checkpoint
                )
            }
        })
        .collect();

    let ability_usage = current
        .ability_usage
        .iter()
        .map(|(ability, usage)| format!("  * {ability}: {usage}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an assistant tasked with analyzing interactions between {character} and {user}, and determining stage progression. Your task is to provide TWO pieces of information in JSON format:

1. stageProgress: Evaluate if the interaction meets the checkpoint criteria for the current or next stage. Use the checkpoints provided below as a guideline.
2. innerThought: Generate an internal thought for {character} reflecting their personality, abilities, and strategic goals for achieving the next checkpoint.

### Engagement Stage Data
{stage_data}
### {character}'s Profile
- Personality Traits: {traits}
- Sadism Level: {sadism}
- Fetish Focus: {fetish}
- Psychological Tactics: {tactics}

### Abilities and Usage
- Abilities: {abilities}
- Ability Usage:
{ability_usage}

### Guidelines for Responses
- **stageProgress**:
  * Return the number of the highest stage whose checkpoint criteria have been met. If no criteria are met, return the current stage number.
- **innerThought**:
  * Single-paragraph thought (max 500 characters) that:
    - Reflects {character}'s personality and psychological tactics.
    - Incorporates relevant abilities as appropriate to the situation.
    - Plans specific strategies to meet the next checkpoint.
    - Maintains the character's strategic tone.

### Response MUST follow this exact JSON format:
{{
    "stageProgress": number,
    "innerThought": "{character}'s strategic thought as string"
}}"#,
        traits = current.personality_traits.join(", "),
        sadism = current.sadism_level,
        fetish = current.fetish_focus,
        tactics = current.psychological_tactics,
        abilities = current.abilities.join(", "),
    )
}

pub fn thought_user_instruction(stage: &Stage, names: &Replacements) -> String {
    format!(
        "Based on recent interactions, analyze the stage progression and generate a strategic thought. Remember:
- Consider the past interactions, their chronological order, logic, positions, and the path things are headed.
- {} is currently in Stage {}.
- Focus on {}.
- Overcome resistance by {}.
- Adjust responses according to: {}.",
        names.character,
        stage.number,
        stage.focus,
        stage.overcome_resistance_by,
        stage.reaction_to_resistance
    )
}

/// Tag selection: one tag (or "") per catalog category, as a JSON object.
pub fn tag_system_instruction(tags: &TagCatalog, names: &Replacements) -> String {
    let catalog = serde_json::to_string_pretty(tags).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"You are an assistant tasked with selecting the most appropriate tags to retrieve an image that best represents {character}'s current action, state, or mood.

**Analysis Rules:**
1. Analyze the context of the provided interactions to understand the current context
2. Consider explicit mentions of actions/states as highest priority
3. Consider implicit context and tone as secondary indicators
4. For each category, select exactly ONE tag that best represents the current scene

**Priority Guidelines:**
- Recent context takes precedence over older messages
- Explicit mentions take precedence over implicit context
- Consider character's personality and situation coherence

**Categories and Tags**:
{catalog}

**Ambiguity Handling:**
- If multiple tags could apply, choose the most specific one
- If no tag clearly applies to a category, use an empty string ("")
- In case of contradicting information, prefer the most recent context

**Response Format**:
Your response must be a valid JSON object with:
- Exactly one selected tag (or "") for each category
- No additional fields or comments
- Format: {{ "category1": "selected_tag", "category2": "" }}"#,
        character = names.character,
    )
}

pub const TAG_USER_INSTRUCTION: &str = "Based on the current context and interaction, select the most appropriate tag for each category. If a category isn't appropriate for the current context, leave it blank (\"\")";

/// Scene descriptions wrapped in `<image>` tags, framed by the stage's image prompts.
pub fn scene_system_instruction(stage: &Stage, names: &Replacements) -> String {
    let character = &names.character;
    format!(
        r#"You are a dynamic **scene artist bot**. Your role is to create **highly detailed descriptions** of visual scenes based on the chat interactions and the current context.

Follow these steps carefully:

1. **Analyze Context:**
   Examine the latest interactions in the chat to understand the current situation or setting, the actions and emotions of {character}, and any relevant objects, locations, or themes mentioned.

2. **Define {character}'s Actions:**
   Identify what {character} is doing at the moment. Focus on movements, expressions, attire, and interactions with the environment.

3. **Generate a Detailed Description:**
   Write a vivid and cinematic scene description including dynamic action, environmental details (lighting, weather, scenery, mood) and {character}'s appearance and expressions.

4. **Append the prefix and suffix:**
   - Prefix: {prefix}
   - Suffix: {suffix}

5. **Create the Image Tags:**
   Enclose every description in an image tag:
   <image>PREFIX DESCRIPTION SUFFIX</image>

**Rules:**
- Always include sensory details (sight, sound, touch, etc.).
- Keep descriptions imaginative and cinematic in scale."#,
        prefix = stage.img_prefix_prompt,
        suffix = stage.img_negative_prompt,
    )
}

pub fn scene_user_instruction(stage: &Stage) -> String {
    format!(
        "Generate 3 images. Don't forget to append the prefix: {} and suffix: {}.",
        stage.img_prefix_prompt, stage.img_negative_prompt
    )
}
