//! Session orchestration: wires host message events to the stage engine, the tag matcher
//! and the narrative advisor.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

use crate::ai::{CompletionBackend, CompletionRequest, NarrativeAdvisor};
use crate::ai_response::{AdvisorVerdict, normalize_advisor_response, parse_tag_selection};
use crate::command::Command;
use crate::content::{ContentCatalog, Replacements, Stage};
use crate::error::{DataLoadError, DirectorError, Result, SelectionError};
use crate::host::{CharacterPrompts, Host};
use crate::matcher::select_best;
use crate::message::{Author, ThreadMessage};
use crate::panel::PanelView;
use crate::prompts;
use crate::repo::{ContentSource, load_catalog, resolve_image_reference};
use crate::session::{DynamicImageMode, SessionState, WindowUpdate};
use crate::settings::Settings;
use crate::stage::{
    AdvanceDecision, AdvanceReason, StageEngine, ThoughtMode, select_guidance_or_thought,
};

/// What a message event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Command(Command),
    Stage(AdvanceDecision),
    Image,
    Ignored,
}

/// Owns the session of one conversation thread.
///
/// Message events must be delivered one at a time; every entry point takes `&mut self`,
/// so a second event cannot start before the previous one has finished.
pub struct Director<H: Host> {
    settings: Settings,
    host: H,
    source: Arc<dyn ContentSource>,
    advisor: NarrativeAdvisor,
    rng: StdRng,
    names: Replacements,
    state: SessionState,
    engine: Option<StageEngine>,
    catalog: Option<ContentCatalog>,
}

impl<H: Host> Director<H> {
    pub fn new(
        settings: Settings,
        host: H,
        source: Arc<dyn ContentSource>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let names = Replacements::new(host.character_name(), host.user_name());
        let state = host.load_session().unwrap_or_default();
        Self {
            settings,
            host,
            source,
            advisor: NarrativeAdvisor::new(backend),
            rng: StdRng::from_os_rng(),
            names,
            state,
            engine: None,
            catalog: None,
        }
    }

    /// Replaces the random source used for image tie-breaks.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn engine(&self) -> Option<&StageEngine> {
        self.engine.as_ref()
    }

    pub fn current_stage(&self) -> Result<&Stage> {
        Ok(self.engine_ref()?.current_stage()?)
    }

    fn engine_ref(&self) -> Result<&StageEngine> {
        self.engine.as_ref().ok_or(DirectorError::NotInitialized)
    }

    // region: --- Initialization

    /// Loads content (if not cached), positions the stage engine and renders the panel.
    pub async fn initialize(&mut self) -> Result<()> {
        log::info!("[Initialization] Starting Application.");
        self.check_and_load_content().await?;
        self.initialize_stages()?;

        self.persist();
        self.host.show_window();
        if self.state.current_image.is_none() {
            self.generate_image_data(None).await;
        }
        self.render_panel();
        log::info!(
            "[Initialization] Application successfully initialized at stage {}",
            self.state.current_stage_number
        );
        Ok(())
    }

    async fn check_and_load_content(&mut self) -> Result<()> {
        let cache = self.host.load_content();
        if let Some(catalog) = cache.catalog() {
            log::info!("[Custom Data] Repository data already loaded.");
            self.catalog = Some(catalog);
            return Ok(());
        }

        log::info!("[Custom Data] Repository data not found. Starting fetch process...");
        let catalog = load_catalog(self.source.as_ref(), &self.settings.base_path)
            .await
            .inspect_err(|e| {
                log::error!("[Custom Data] Critical error in data fetching process: {e}")
            })?;
        self.host.save_content(catalog.clone().into());
        self.catalog = Some(catalog);
        Ok(())
    }

    fn initialize_stages(&mut self) -> Result<()> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or(DataLoadError::StagesMissing)?;
        let stages: Vec<Stage> = catalog
            .stages
            .iter()
            .map(|stage| stage.personalize(&self.names))
            .collect();

        let engine = StageEngine::starting_at(stages, self.state.current_stage_number);
        let stage = engine.current_stage()?;
        if stage.number != self.state.current_stage_number {
            log::warn!(
                "[Stage] Stage {} not found, starting at stage {}",
                self.state.current_stage_number,
                stage.number
            );
            self.state.current_stage_number = stage.number;
        }
        self.state.current_stage_index = engine.current_index();
        self.engine = Some(engine);
        log::info!("[Initialization] Stages successfully initialized");
        Ok(())
    }

    // endregion: --- Initialization

    // region: --- Message events

    /// Handles one message that the host has just appended to the thread.
    ///
    /// Commands are stripped from the thread before anything else can fail.
    pub async fn on_message_added(&mut self, message: ThreadMessage) -> Result<MessageOutcome> {
        if message.is_command() {
            return self.handle_command_message(&message).await;
        }

        if self.engine.is_none() {
            self.initialize().await?;
        }

        match message.author {
            Author::User => self.handle_user_message().await,
            Author::Ai => self.handle_ai_message().await,
            _ => Ok(MessageOutcome::Ignored),
        }
    }

    async fn handle_user_message(&mut self) -> Result<MessageOutcome> {
        self.state.user_message_counter += 1;
        self.persist();

        let verdict = if self.state.dynamic_thought || self.state.system_guidance {
            Some(self.generate_thought(ThoughtMode::Automatic).await?)
        } else {
            None
        };

        let decision = self
            .engine_ref()?
            .evaluate_advance(self.state.user_message_counter, verdict.as_ref())?;

        match decision.reason {
            AdvanceReason::None => log::info!("[Stage Advance]: No advances needed"),
            reason => {
                log::info!("[Stage Advance]: Advancing by: {reason:?}");
                self.next_stage().await?;
            }
        }
        Ok(MessageOutcome::Stage(decision))
    }

    async fn handle_ai_message(&mut self) -> Result<MessageOutcome> {
        let mode = self.state.dynamic_image_mode;
        if mode == DynamicImageMode::Off {
            return Ok(MessageOutcome::Ignored);
        }

        log::debug!("[Message Interception] Calling dynamic image");
        self.select_context_image().await?;

        if mode.shows_in_chat() {
            if let Some(chat_image) = &self.state.chat_image {
                log::debug!("[Dynamic image] Posting image to chat");
                let content = format!(
                    r#"<img src="{chat_image}" style="max-width: 75vw; max-height: 110vw;">"#
                );
                self.host.push_message(
                    ThreadMessage::system(content)
                        .hidden_from(Author::Ai)
                        .expects_reply(false),
                );
            }
        }
        Ok(MessageOutcome::Image)
    }

    async fn handle_command_message(&mut self, message: &ThreadMessage) -> Result<MessageOutcome> {
        let command = Command::parse(&message.content)
            .unwrap_or_else(|| Command::Unknown(message.content.clone()));
        log::info!("[Event - Message] Command detected: {}", message.content);

        if self.host.messages().last() == Some(message) {
            self.host.pop_message();
        }

        if command.needs_stages() && self.engine.is_none() {
            self.initialize().await?;
        }
        self.run_command(&command).await?;
        Ok(MessageOutcome::Command(command))
    }

    async fn run_command(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::OpenWindow => self.host.show_window(),
            Command::CustomImage => self.custom_image().await?,
            Command::NextStage => {
                self.next_stage().await?;
            }
            Command::PreviousStage => {
                self.previous_stage().await?;
            }
            Command::Thought => {
                self.generate_thought(ThoughtMode::Thought).await?;
            }
            Command::Guidance => self.generate_guidance()?,
            Command::ChangeImage => self.select_context_image().await?,
            Command::ImageMode(mode) => self.set_dynamic_image_mode(*mode),
            Command::Unknown(text) => log::warn!("[Event - Message] Unknown command: {text}"),
        }
        Ok(())
    }

    // endregion: --- Message events

    // region: --- Stage navigation

    /// Moves to the next stage. Returns `false` when already at the last one.
    pub async fn next_stage(&mut self) -> Result<bool> {
        let engine = self.engine.as_mut().ok_or(DirectorError::NotInitialized)?;
        let before = engine.current_index();
        if engine.advance() == before {
            return Ok(false);
        }
        self.update_current_stage().await?;
        Ok(true)
    }

    /// Moves to the previous stage. Returns `false` when already at the first one.
    pub async fn previous_stage(&mut self) -> Result<bool> {
        let engine = self.engine.as_mut().ok_or(DirectorError::NotInitialized)?;
        let before = engine.current_index();
        if engine.retreat() == before {
            return Ok(false);
        }
        self.update_current_stage().await?;
        Ok(true)
    }

    async fn update_current_stage(&mut self) -> Result<()> {
        let engine = self.engine.as_ref().ok_or(DirectorError::NotInitialized)?;
        let number = engine.current_stage()?.number;
        engine.apply_transition(&mut self.state, number);
        self.persist();

        self.generate_image_data(None).await;
        self.update_window(WindowUpdate::auto());
        self.update_character()
    }

    fn update_character(&mut self) -> Result<()> {
        let stage = self.current_stage()?;
        let prompts = CharacterPrompts {
            image_prompt_prefix: stage.img_prefix_prompt.clone(),
            image_prompt_suffix: stage.img_negative_prompt.clone(),
            image_prompt_triggers: stage.img_trigger_prompt.clone(),
        };
        self.host.update_character_prompts(prompts);
        Ok(())
    }

    // endregion: --- Stage navigation

    // region: --- Thoughts and guidance

    /// Asks the advisor for stage progress and an inner thought, then posts the hidden
    /// guidance or thought message. Advisor failures resolve to the fallback verdict.
    pub async fn generate_thought(&mut self, mode: ThoughtMode) -> Result<AdvisorVerdict> {
        let engine = self.engine_ref()?;
        let stage = engine.current_stage()?;
        let request = CompletionRequest::new(
            prompts::thought_system_instruction(
                engine.stages(),
                engine.current_index(),
                &self.names,
            ),
            prompts::thought_user_instruction(stage, &self.names),
        )
        .context_messages(self.settings.context_messages)
        .timeout(self.settings.thought_timeout());

        self.update_window(WindowUpdate::thought(true));
        let response = self
            .advisor
            .complete(request, self.host.messages(), &self.names)
            .await;
        log::debug!("[LLM Response]: {response}");

        let engine = self.engine_ref()?;
        let verdict = normalize_advisor_response(&response, engine.stages(), engine.current_index());
        log::info!(
            "[Stage State]: progress {} ({})",
            verdict.stage_number,
            verdict.thought
        );

        let posted = self.update_inner_thought(Some(&verdict.thought), mode);
        self.update_window(WindowUpdate::thought(false));
        posted?;
        Ok(verdict)
    }

    /// Posts the full guidance block for the current stage.
    pub fn generate_guidance(&mut self) -> Result<()> {
        self.update_inner_thought(None, ThoughtMode::Guidance)
    }

    fn update_inner_thought(&mut self, thought: Option<&str>, mode: ThoughtMode) -> Result<()> {
        let engine = self.engine.as_ref().ok_or(DirectorError::NotInitialized)?;
        let stage = engine.current_stage()?;
        let message =
            select_guidance_or_thought(&mut self.state, stage, &self.names.character, mode, thought);
        self.persist();

        if let Some(content) = message {
            self.host.push_message(
                ThreadMessage::system(content)
                    .hidden_from(Author::User)
                    .expects_reply(mode == ThoughtMode::Automatic),
            );
        }
        Ok(())
    }

    // endregion: --- Thoughts and guidance

    // region: --- Images

    /// Lets the advisor pick tags for the current scene and switches to the best match.
    pub async fn select_context_image(&mut self) -> Result<()> {
        log::debug!("[Context image selection] Starting");
        self.update_window(WindowUpdate::changing(true));
        let result = self.pick_context_image().await;
        self.update_window(WindowUpdate::changing(false));
        result
    }

    async fn pick_context_image(&mut self) -> Result<()> {
        let catalog = self.catalog.as_ref().ok_or(DirectorError::NotInitialized)?;
        if catalog.images.is_empty() {
            return Err(SelectionError::NoCandidates.into());
        }

        let request = CompletionRequest::new(
            prompts::tag_system_instruction(&catalog.tags, &self.names),
            prompts::TAG_USER_INSTRUCTION,
        )
        .context_messages(self.settings.context_messages)
        .timeout(self.settings.tag_timeout());
        let response = self
            .advisor
            .complete(request, self.host.messages(), &self.names)
            .await;

        let selected = match parse_tag_selection(&response) {
            Ok(selected) => selected,
            Err(e) => {
                log::error!("[Context image selection] Error: {e}");
                return Ok(());
            }
        };
        log::info!("[Tag Selection] Selected tags: {selected:?}");

        let catalog = self.catalog.as_ref().ok_or(DirectorError::NotInitialized)?;
        let url = select_best(&catalog.images, &selected, &mut self.rng)?
            .url
            .clone();
        self.generate_image_data(Some(url)).await;
        Ok(())
    }

    /// Resolves the image to show (candidate, current, or stage default) into a
    /// displayable reference and stores it for the panel and the chat.
    async fn generate_image_data(&mut self, candidate: Option<String>) {
        let stage_image = self
            .current_stage()
            .map(|stage| stage.image.clone())
            .unwrap_or_default();
        let url = candidate
            .or_else(|| self.state.current_image.clone())
            .unwrap_or(stage_image);
        if url.is_empty() {
            return;
        }

        let remote = url.contains("github.com");
        if remote {
            self.update_window(WindowUpdate {
                loading: Some(true),
                changing: Some(true),
                ..WindowUpdate::default()
            });
        }

        let data = resolve_image_reference(self.source.as_ref(), &url).await;
        if self.state.dynamic_image_mode.shows_in_panel() {
            self.state.current_image = Some(data.clone());
        }
        self.state.chat_image = Some(data);
        if remote {
            self.state.clear_image_flags();
        }
        self.persist();
    }

    /// Posts three scene descriptions for the current stage as a system message.
    pub async fn custom_image(&mut self) -> Result<()> {
        let stage = self.current_stage()?;
        let request = CompletionRequest::new(
            prompts::scene_system_instruction(stage, &self.names),
            prompts::scene_user_instruction(stage),
        )
        .context_messages(self.settings.context_messages)
        .timeout(self.settings.scene_timeout());

        let response = self
            .advisor
            .complete(request, self.host.messages(), &self.names)
            .await;
        self.host.push_message(ThreadMessage::system(response));
        Ok(())
    }

    // endregion: --- Images

    // region: --- Panel controls

    pub fn set_dynamic_image_mode(&mut self, mode: DynamicImageMode) {
        log::info!("[Dynamic Image] Setting mode to: {mode}");
        self.state.dynamic_image_mode = mode;
        self.persist();
        self.update_window(WindowUpdate::auto());
    }

    pub fn toggle_dynamic_thought(&mut self, enabled: bool) {
        log::info!("[Dynamic Thought]: {enabled}");
        self.state.dynamic_thought = enabled;
        self.persist();
        self.update_window(WindowUpdate::auto());
    }

    pub fn toggle_system_guidance(&mut self, enabled: bool) {
        log::info!("[System Guidance]: {enabled}");
        self.state.system_guidance = enabled;
        self.persist();
        self.update_window(WindowUpdate::auto());
    }

    fn update_window(&mut self, update: WindowUpdate) {
        let forced = update.apply(&mut self.state);
        if forced || self.state.dynamic_image_mode.shows_in_panel() {
            self.render_panel();
        }
    }

    fn render_panel(&mut self) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        let Ok(stage) = engine.current_stage() else {
            return;
        };
        let html = PanelView {
            stage,
            is_first: engine.is_first(),
            is_last: engine.is_last(),
            state: &self.state,
        }
        .render();
        self.host.render_panel(html);
        log::debug!("[Window - Update] Window content updated");
    }

    // endregion: --- Panel controls

    fn persist(&mut self) {
        self.host.save_session(&self.state);
    }
}
