//! Capabilities the chat-character host provides to the director.

use crate::content::ContentCache;
use crate::message::ThreadMessage;
use crate::session::SessionState;

/// Image-generation prompts the host attaches to the character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterPrompts {
    pub image_prompt_prefix: String,
    pub image_prompt_suffix: String,
    pub image_prompt_triggers: String,
}

/// One conversation thread as seen by the director.
///
/// The host delivers message events for a thread one at a time; every method is called
/// from within a single `Director` invocation.
pub trait Host: Send {
    fn character_name(&self) -> &str;
    fn user_name(&self) -> &str;

    fn messages(&self) -> &[ThreadMessage];
    fn push_message(&mut self, message: ThreadMessage);
    fn pop_message(&mut self) -> Option<ThreadMessage>;

    fn show_window(&mut self);
    /// Replaces the whole panel document.
    fn render_panel(&mut self, html: String);
    fn update_character_prompts(&mut self, prompts: CharacterPrompts);

    // Per-thread storage.
    fn load_session(&self) -> Option<SessionState>;
    fn save_session(&mut self, state: &SessionState);
    fn load_content(&self) -> ContentCache;
    fn save_content(&mut self, cache: ContentCache);
}

/// In-memory host, used by the console binary and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    pub character_name: String,
    pub user_name: String,
    pub messages: Vec<ThreadMessage>,
    pub window_visible: bool,
    pub panel: Option<String>,
    pub render_count: usize,
    pub prompts: CharacterPrompts,
    pub session: Option<SessionState>,
    pub content: ContentCache,
}

impl MemoryHost {
    pub fn new(character_name: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            character_name: character_name.into(),
            user_name: user_name.into(),
            ..Self::default()
        }
    }
}

impl Host for MemoryHost {
    fn character_name(&self) -> &str {
        &self.character_name
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }

    fn messages(&self) -> &[ThreadMessage] {
        &self.messages
    }

    fn push_message(&mut self, message: ThreadMessage) {
        self.messages.push(message);
    }

    fn pop_message(&mut self) -> Option<ThreadMessage> {
        self.messages.pop()
    }

    fn show_window(&mut self) {
        self.window_visible = true;
    }

    fn render_panel(&mut self, html: String) {
        self.render_count += 1;
        self.panel = Some(html);
    }

    fn update_character_prompts(&mut self, prompts: CharacterPrompts) {
        self.prompts = prompts;
    }

    fn load_session(&self) -> Option<SessionState> {
        self.session.clone()
    }

    fn save_session(&mut self, state: &SessionState) {
        self.session = Some(state.clone());
    }

    fn load_content(&self) -> ContentCache {
        self.content.clone()
    }

    fn save_content(&mut self, cache: ContentCache) {
        self.content = cache;
    }
}
