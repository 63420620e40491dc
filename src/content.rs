//! Content catalog records: stages, image entries and the tag catalog.
//!
//! Everything here is parsed once at the content-load boundary. Payloads are first checked
//! against the loose structural rules the content repository follows, then deserialized
//! into typed records, so nothing downstream has to re-check shapes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::DataLoadError;

pub const DEFAULT_MESSAGES_QTY: u32 = 4;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stage {
    pub number: u32,
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub summary: String,
    #[serde(default, deserialize_with = "text")]
    pub checkpoint: String,
    #[serde(default, deserialize_with = "text")]
    pub focus: String,
    #[serde(default, deserialize_with = "text")]
    pub action_plan: String,
    #[serde(default, deserialize_with = "text")]
    pub overcome_resistance_by: String,
    #[serde(default, deserialize_with = "text")]
    pub reaction_to_resistance: String,
    #[serde(default, deserialize_with = "text_list")]
    pub personality_traits: Vec<String>,
    #[serde(default, deserialize_with = "text")]
    pub sadism_level: String,
    #[serde(default, deserialize_with = "text")]
    pub physical_form: String,
    #[serde(default, deserialize_with = "text")]
    pub fetish_focus: String,
    #[serde(default, deserialize_with = "text")]
    pub psychological_tactics: String,
    #[serde(default, deserialize_with = "text_list")]
    pub abilities: Vec<String>,
    #[serde(default, deserialize_with = "text_map")]
    pub ability_usage: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "text")]
    pub image: String,
    #[serde(default, deserialize_with = "text")]
    pub img_prefix_prompt: String,
    #[serde(default, deserialize_with = "text")]
    pub img_negative_prompt: String,
    #[serde(default, deserialize_with = "text")]
    pub img_trigger_prompt: String,
    #[serde(default, rename = "messagesQty")]
    pub messages_qty: Option<u32>,
}

impl Stage {
    /// User messages needed before the stage advances on its own.
    pub fn messages_threshold(&self) -> u32 {
        match self.messages_qty {
            Some(qty) if qty > 0 => qty,
            _ => DEFAULT_MESSAGES_QTY,
        }
    }

    /// Returns a copy with `{{char}}` / `{{user}}` substituted in every text field.
    pub fn personalize(&self, replacements: &Replacements) -> Stage {
        let r = |s: &String| replacements.apply(s);
        Stage {
            number: self.number,
            name: r(&self.name),
            summary: r(&self.summary),
            checkpoint: r(&self.checkpoint),
            focus: r(&self.focus),
            action_plan: r(&self.action_plan),
            overcome_resistance_by: r(&self.overcome_resistance_by),
            reaction_to_resistance: r(&self.reaction_to_resistance),
            personality_traits: self.personality_traits.iter().map(r).collect(),
            sadism_level: r(&self.sadism_level),
            physical_form: r(&self.physical_form),
            fetish_focus: r(&self.fetish_focus),
            psychological_tactics: r(&self.psychological_tactics),
            abilities: self.abilities.iter().map(r).collect(),
            ability_usage: self
                .ability_usage
                .iter()
                .map(|(ability, usage)| (r(ability), r(usage)))
                .collect(),
            image: r(&self.image),
            img_prefix_prompt: r(&self.img_prefix_prompt),
            img_negative_prompt: r(&self.img_negative_prompt),
            img_trigger_prompt: r(&self.img_trigger_prompt),
            messages_qty: self.messages_qty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    One(String),
    Many(Vec<String>),
}

impl TagValue {
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            TagValue::One(value) => value == tag,
            TagValue::Many(values) => values.iter().any(|value| value == tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub url: String,
    #[serde(default)]
    pub tags: BTreeMap<String, TagValue>,
}

/// Known tag values per category. Only used to prompt the advisor.
pub type TagCatalog = BTreeMap<String, Vec<String>>;

/// Category to selected tag, as proposed by the advisor.
pub type TagSelection = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct ContentCatalog {
    pub stages: Vec<Stage>,
    pub images: Vec<ImageEntry>,
    pub tags: TagCatalog,
}

/// Catalog data persisted in per-thread storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentCache {
    pub stages: Option<Vec<Stage>>,
    pub images: Option<Vec<ImageEntry>>,
    pub tags: Option<TagCatalog>,
}

impl ContentCache {
    pub fn needs_refresh(&self) -> bool {
        self.stages.is_none() || self.images.is_none() || self.tags.is_none()
    }

    pub fn catalog(&self) -> Option<ContentCatalog> {
        Some(ContentCatalog {
            stages: self.stages.clone()?,
            images: self.images.clone()?,
            tags: self.tags.clone()?,
        })
    }
}

impl From<ContentCatalog> for ContentCache {
    fn from(catalog: ContentCatalog) -> Self {
        ContentCache {
            stages: Some(catalog.stages),
            images: Some(catalog.images),
            tags: Some(catalog.tags),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacements {
    pub character: String,
    pub user: String,
}

impl Replacements {
    pub fn new(character: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            user: user.into(),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        text.replace("{{char}}", &self.character)
            .replace("{{user}}", &self.user)
    }
}

/// Structural check applied to every fetched resource before typed parsing.
///
/// Arrays must hold only objects. Objects must map every key to an array, or to an
/// object whose own values are strings or arrays.
pub fn validate_structure(data: &Value) -> bool {
    match data {
        Value::Array(items) => items.iter().all(Value::is_object),
        Value::Object(map) => map.values().all(|value| match value {
            Value::Array(_) => true,
            Value::Object(inner) => inner
                .values()
                .all(|v| matches!(v, Value::String(_) | Value::Array(_))),
            _ => false,
        }),
        _ => false,
    }
}

pub fn parse_stages(mut data: Value) -> Result<Vec<Stage>, DataLoadError> {
    merge_resistance_keys(&mut data);
    let stages: Vec<Stage> = serde_json::from_value(data).map_err(|e| malformed("stages", e))?;

    if stages.is_empty() {
        return Err(malformed("stages", "no stages defined"));
    }
    if stages[0].number < 1 {
        return Err(malformed("stages", "stage numbers start at 1"));
    }
    if let Some(pair) = stages.windows(2).find(|pair| pair[1].number <= pair[0].number) {
        return Err(malformed(
            "stages",
            format!(
                "stage {} follows stage {}; numbers must strictly increase",
                pair[1].number, pair[0].number
            ),
        ));
    }
    Ok(stages)
}

// Stage files spell the resistance field both ways, sometimes in the same record.
// The snake_case value wins; the camelCase one fills in when it is missing or blank.
fn merge_resistance_keys(data: &mut Value) {
    const KEY: &str = "overcome_resistance_by";
    const CAMEL_KEY: &str = "overcomeResistanceBy";

    let Value::Array(items) = data else {
        return;
    };
    for item in items.iter_mut().filter_map(Value::as_object_mut) {
        let Some(camel) = item.remove(CAMEL_KEY) else {
            continue;
        };
        let blank = match item.get(KEY) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if blank {
            item.insert(KEY.to_string(), camel);
        }
    }
}

pub fn parse_images(data: Value) -> Result<Vec<ImageEntry>, DataLoadError> {
    serde_json::from_value(data).map_err(|e| malformed("images", e))
}

pub fn parse_tags(data: Value) -> Result<TagCatalog, DataLoadError> {
    serde_json::from_value(data).map_err(|e| malformed("tags", e))
}

fn malformed(resource: &str, reason: impl ToString) -> DataLoadError {
    DataLoadError::Malformed {
        resource: resource.to_string(),
        reason: reason.to_string(),
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(value_to_text).collect(),
        other => vec![value_to_text(other)],
    })
}

fn text_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(map
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value_to_text(value)))
        .collect())
}
