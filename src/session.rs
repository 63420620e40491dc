// session.rs
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Where dynamically selected images are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DynamicImageMode {
    #[default]
    Both,
    OnlyHere,
    InChat,
    Off,
}

impl DynamicImageMode {
    pub fn shows_in_panel(self) -> bool {
        matches!(self, DynamicImageMode::Both | DynamicImageMode::OnlyHere)
    }

    pub fn shows_in_chat(self) -> bool {
        matches!(self, DynamicImageMode::Both | DynamicImageMode::InChat)
    }
}

/// Mutable per-thread state, persisted through host storage after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub current_stage_number: u32,
    pub previous_stage_number: u32,
    pub user_message_counter: u32,
    pub dynamic_image_mode: DynamicImageMode,
    pub dynamic_thought: bool,
    pub system_guidance: bool,
    pub current_image: Option<String>,
    pub chat_image: Option<String>,

    #[serde(skip)]
    pub current_stage_index: usize,
    #[serde(skip)]
    pub image_loading: bool,
    #[serde(skip)]
    pub image_changing: bool,
    #[serde(skip)]
    pub thought_generating: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            current_stage_number: 1,
            previous_stage_number: 0,
            user_message_counter: 0,
            dynamic_image_mode: DynamicImageMode::Both,
            dynamic_thought: true,
            system_guidance: true,
            current_image: None,
            chat_image: None,
            current_stage_index: 0,
            image_loading: false,
            image_changing: false,
            thought_generating: false,
        }
    }
}

impl SessionState {
    pub fn stage_just_changed(&self) -> bool {
        self.previous_stage_number != self.current_stage_number
    }

    pub fn clear_image_flags(&mut self) {
        self.image_loading = false;
        self.image_changing = false;
    }
}

/// Transient flag changes requested alongside a panel refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowUpdate {
    pub auto: bool,
    pub loading: Option<bool>,
    pub changing: Option<bool>,
    pub thought: Option<bool>,
}

impl WindowUpdate {
    pub fn auto() -> Self {
        Self {
            auto: true,
            ..Self::default()
        }
    }

    pub fn changing(changing: bool) -> Self {
        Self {
            changing: Some(changing),
            ..Self::default()
        }
    }

    pub fn thought(thought: bool) -> Self {
        Self {
            thought: Some(thought),
            ..Self::default()
        }
    }

    /// Applies the flag changes and reports whether a render is forced.
    pub fn apply(self, state: &mut SessionState) -> bool {
        if let Some(loading) = self.loading {
            state.image_loading = loading;
        }
        if let Some(changing) = self.changing {
            state.image_changing = changing;
        }
        if let Some(thought) = self.thought {
            state.thought_generating = thought;
        }
        self.auto || self.loading.is_some() || self.changing.is_some() || self.thought.is_some()
    }
}
