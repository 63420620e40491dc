use async_trait::async_trait;
use serde_json::{Value, json};
use stage_director::ai::{ChatMessage, CompletionBackend};
use stage_director::command::Command;
use stage_director::content::ContentCache;
use stage_director::error::{AdvisorError, DataLoadError, FetchError, SelectionError};
use stage_director::repo::{FetchedImage, fetch_image_data, load_catalog};
use stage_director::*;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE_PATH: &str = "chars/mira";

// region: --- Fakes

/// Answers each advisor round by the kind of system instruction it receives.
#[derive(Default)]
struct ScriptedBackend {
    thought: String,
    tags: String,
    scene: String,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedBackend {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AdvisorError> {
        let system = messages
            .first()
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let (kind, reply) = if system.contains("stageProgress") {
            ("thought", &self.thought)
        } else if system.contains("scene artist") {
            ("scene", &self.scene)
        } else {
            ("tags", &self.tags)
        };
        self.calls.lock().unwrap().push(kind);
        Ok(reply.clone())
    }
}

#[derive(Default)]
struct FakeSource {
    files: HashMap<String, Value>,
    json_fetches: AtomicUsize,
    broken_images: bool,
}

impl FakeSource {
    fn with_catalog() -> Self {
        let mut files = HashMap::new();
        files.insert(format!("{BASE_PATH}/stages.json"), stages_json());
        files.insert(format!("{BASE_PATH}/images.json"), images_json());
        files.insert(format!("{BASE_PATH}/imageTags.json"), tags_json());
        Self {
            files,
            ..Self::default()
        }
    }

    fn without(mut self, file: &str) -> Self {
        self.files.remove(&format!("{BASE_PATH}/{file}"));
        self
    }

    fn replace(mut self, file: &str, value: Value) -> Self {
        self.files.insert(format!("{BASE_PATH}/{file}"), value);
        self
    }

    fn with_broken_images(mut self) -> Self {
        self.broken_images = true;
        self
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch_json(&self, path: &str) -> Result<Value, FetchError> {
        self.json_fetches.fetch_add(1, Ordering::SeqCst);
        self.files.get(path).cloned().ok_or(FetchError::Status(404))
    }

    async fn fetch_image(&self, _url: &str) -> Result<FetchedImage, FetchError> {
        if self.broken_images {
            return Err(FetchError::Status(500));
        }
        Ok(FetchedImage {
            content_type: "image/png".to_string(),
            bytes: b"png".to_vec(),
        })
    }
}

// endregion: --- Fakes

// region: --- Fixtures

fn stages_json() -> Value {
    json!([
        {
            "number": 1,
            "name": "First Meeting",
            "checkpoint": "learn {{user}}'s name",
            "image": "https://cdn.example.com/stage1.png",
            "img_prefix_prompt": "p1",
            "img_negative_prompt": "n1",
            "img_trigger_prompt": "t1",
            "messagesQty": 2
        },
        {
            "number": 2,
            "name": "Trust",
            "checkpoint": "share a secret",
            "image": "https://github.com/me/content/raw/main/stage2.png",
            "img_prefix_prompt": "p2",
            "img_negative_prompt": "n2",
            "img_trigger_prompt": "t2"
        },
        {
            "number": 3,
            "name": "Bond",
            "checkpoint": "make a promise",
            "image": "https://cdn.example.com/stage3.png"
        }
    ])
}

fn images_json() -> Value {
    json!([
        { "url": "https://cdn.example.com/happy-park.png", "tags": { "mood": "happy", "place": "park" } },
        { "url": "https://cdn.example.com/sad-home.png", "tags": { "mood": ["sad", "tired"], "place": "home" } }
    ])
}

fn tags_json() -> Value {
    json!({ "mood": ["happy", "sad", "tired"], "place": ["park", "home"] })
}

fn settings() -> Settings {
    Settings {
        base_path: BASE_PATH.to_string(),
        ..Settings::default()
    }
}

fn backend(thought: &str, tags: &str) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend {
        thought: thought.to_string(),
        tags: tags.to_string(),
        scene: "<image>p1 a quiet garden n1</image>".to_string(),
        ..ScriptedBackend::default()
    })
}

fn director(
    backend: Arc<ScriptedBackend>,
    source: Arc<FakeSource>,
    host: MemoryHost,
) -> Director<MemoryHost> {
    Director::new(settings(), host, source, backend)
}

async fn ready_director(backend: Arc<ScriptedBackend>) -> Director<MemoryHost> {
    let mut director = director(
        backend,
        Arc::new(FakeSource::with_catalog()),
        MemoryHost::new("Mira", "Sam"),
    );
    director.initialize().await.expect("initialize");
    director
}

async fn say(director: &mut Director<MemoryHost>, message: ThreadMessage) -> MessageOutcome {
    director.host_mut().push_message(message.clone());
    director
        .on_message_added(message)
        .await
        .expect("message handled")
}

fn system_messages(director: &Director<MemoryHost>) -> Vec<&ThreadMessage> {
    director
        .host()
        .messages()
        .iter()
        .filter(|message| message.author == Author::System)
        .collect()
}

// endregion: --- Fixtures

#[tokio::test]
async fn test_initialize_loads_catalog_and_renders_panel() {
    let director = ready_director(backend("", "")).await;

    let host = director.host();
    assert!(host.window_visible);
    assert!(host.content.catalog().is_some());
    let panel = host.panel.as_deref().expect("panel rendered");
    assert!(panel.contains("Stage 1: First Meeting"));
    assert_eq!(
        director.state().current_image.as_deref(),
        Some("https://cdn.example.com/stage1.png")
    );
    assert_eq!(
        director.current_stage().unwrap().checkpoint,
        "learn Sam's name"
    );
}

#[tokio::test]
async fn test_initialize_reports_every_missing_resource() {
    let source = Arc::new(FakeSource::with_catalog().without("images.json"));
    let mut director = director(backend("", ""), source, MemoryHost::new("Mira", "Sam"));

    let err = director.initialize().await.unwrap_err();
    match err {
        DirectorError::DataLoad(err @ DataLoadError::Failed(_)) => {
            assert_eq!(err.failed_resources(), vec!["images"]);
            assert!(err.to_string().contains("status: 404"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(director.engine().is_none());
}

#[tokio::test]
async fn test_window_command_runs_and_is_stripped_when_content_is_missing() {
    let source = Arc::new(FakeSource::with_catalog().without("images.json"));
    let mut director = director(backend("", ""), source, MemoryHost::new("Mira", "Sam"));

    let outcome = say(&mut director, ThreadMessage::user("/openwindow")).await;
    assert_eq!(outcome, MessageOutcome::Command(Command::OpenWindow));
    assert!(director.host().window_visible);
    assert!(director.host().messages().is_empty());
    assert!(director.engine().is_none());
}

#[tokio::test]
async fn test_stage_command_is_stripped_even_when_loading_fails() {
    let source = Arc::new(FakeSource::with_catalog().without("images.json"));
    let mut director = director(backend("", ""), source, MemoryHost::new("Mira", "Sam"));

    let message = ThreadMessage::user("/nextstage");
    director.host_mut().push_message(message.clone());
    let err = director.on_message_added(message).await.unwrap_err();
    assert!(matches!(err, DirectorError::DataLoad(_)));
    assert!(director.host().messages().is_empty());
}

#[tokio::test]
async fn test_cached_content_skips_fetching() {
    let source = Arc::new(FakeSource::with_catalog());
    let catalog = load_catalog(source.as_ref(), BASE_PATH).await.unwrap();
    let fetches_before = source.json_fetches.load(Ordering::SeqCst);

    let mut host = MemoryHost::new("Mira", "Sam");
    host.content = ContentCache::from(catalog);
    let mut director = director(backend("", ""), source.clone(), host);
    director.initialize().await.unwrap();

    assert_eq!(source.json_fetches.load(Ordering::SeqCst), fetches_before);
}

#[tokio::test]
async fn test_restores_saved_session() {
    let mut host = MemoryHost::new("Mira", "Sam");
    host.session = Some(SessionState {
        current_stage_number: 3,
        previous_stage_number: 3,
        dynamic_image_mode: DynamicImageMode::OnlyHere,
        ..SessionState::default()
    });
    let mut director = director(backend("", ""), Arc::new(FakeSource::with_catalog()), host);
    director.initialize().await.unwrap();

    assert_eq!(director.engine().unwrap().current_index(), 2);
    assert_eq!(
        director.state().dynamic_image_mode,
        DynamicImageMode::OnlyHere
    );
}

#[tokio::test]
async fn test_first_message_initializes_lazily() {
    let mut director = director(
        backend("not json", ""),
        Arc::new(FakeSource::with_catalog()),
        MemoryHost::new("Mira", "Sam"),
    );
    director.toggle_dynamic_thought(false);
    director.toggle_system_guidance(false);

    let outcome = say(&mut director, ThreadMessage::user("hello")).await;
    assert!(director.engine().is_some());
    assert_eq!(
        outcome,
        MessageOutcome::Stage(AdvanceDecision {
            advance: false,
            reason: AdvanceReason::None
        })
    );
}

#[tokio::test]
async fn test_message_count_advances_stage() {
    let backend = backend("", "");
    let mut director = ready_director(backend.clone()).await;
    director.toggle_dynamic_thought(false);
    director.toggle_system_guidance(false);

    say(&mut director, ThreadMessage::user("hi")).await;
    assert_eq!(director.state().user_message_counter, 1);

    let outcome = say(&mut director, ThreadMessage::user("how are you?")).await;
    assert_eq!(
        outcome,
        MessageOutcome::Stage(AdvanceDecision {
            advance: true,
            reason: AdvanceReason::Count
        })
    );

    let state = director.state();
    assert_eq!(state.current_stage_number, 2);
    assert_eq!(state.previous_stage_number, 1);
    assert_eq!(state.user_message_counter, 0);
    // Stage 2's image lives on GitHub and is inlined.
    assert_eq!(
        state.current_image.as_deref(),
        Some("data:image/png;base64,cG5n")
    );
    assert_eq!(state.chat_image, state.current_image);
    assert_eq!(director.host().prompts.image_prompt_prefix, "p2");
    assert_eq!(director.host().prompts.image_prompt_triggers, "t2");
    assert!(backend.calls().is_empty());
    assert_eq!(director.host().session.as_ref(), Some(director.state()));
}

#[tokio::test]
async fn test_failed_image_fetch_keeps_original_reference() {
    let source = Arc::new(FakeSource::with_catalog().with_broken_images());
    let mut director = director(backend("", ""), source, MemoryHost::new("Mira", "Sam"));
    director.initialize().await.unwrap();

    assert!(director.next_stage().await.unwrap());

    let state = director.state();
    let github_url = "https://github.com/me/content/raw/main/stage2.png";
    assert_eq!(state.current_image.as_deref(), Some(github_url));
    assert_eq!(state.chat_image.as_deref(), Some(github_url));
    assert!(!state.image_loading);
    assert!(!state.image_changing);
}

#[tokio::test]
async fn test_advisor_progress_advances_stage() {
    let backend = backend(
        r#"Sure! {"stageProgress": 2, "innerThought": "Sam trusts me now."}"#,
        "",
    );
    let mut director = ready_director(backend.clone()).await;

    let outcome = say(&mut director, ThreadMessage::user("My name is Sam.")).await;
    assert_eq!(
        outcome,
        MessageOutcome::Stage(AdvanceDecision {
            advance: true,
            reason: AdvanceReason::Llm
        })
    );
    assert_eq!(director.state().current_stage_number, 2);
    assert_eq!(backend.calls(), vec!["thought"]);

    // Stage 1 had just started, so the thought arrives with the full guidance block.
    let posted = system_messages(&director);
    assert_eq!(posted.len(), 1);
    assert!(posted[0].content.starts_with("MIRA'S INNER THOUGHT: Sam trusts me now."));
    assert!(posted[0].content.contains("learn Sam's name"));
    assert_eq!(posted[0].hidden_from, vec![Author::User]);
    assert_eq!(posted[0].expects_reply, Some(true));
}

#[tokio::test]
async fn test_unreadable_advisor_reply_falls_back() {
    let mut director = ready_director(backend("not json", "")).await;
    director.toggle_system_guidance(false);

    let outcome = say(&mut director, ThreadMessage::user("hello")).await;
    assert_eq!(
        outcome,
        MessageOutcome::Stage(AdvanceDecision {
            advance: false,
            reason: AdvanceReason::None
        })
    );
    assert_eq!(director.state().current_stage_number, 1);

    let posted = system_messages(&director);
    assert_eq!(
        posted[0].content,
        "MIRA'S INNER THOUGHT: I need to focus on learn Sam's name to progress further..."
    );
}

#[tokio::test]
async fn test_commands_are_handled_and_removed() {
    let mut director = ready_director(backend("", "")).await;

    let outcome = say(&mut director, ThreadMessage::user("/nextstage")).await;
    assert_eq!(outcome, MessageOutcome::Command(Command::NextStage));
    assert_eq!(director.state().current_stage_number, 2);

    say(&mut director, ThreadMessage::user("/prevstage")).await;
    assert_eq!(director.state().current_stage_number, 1);
    // Already at the first stage.
    say(&mut director, ThreadMessage::user("/prevstage")).await;
    assert_eq!(director.state().current_stage_number, 1);

    let outcome = say(&mut director, ThreadMessage::user("/imagemode off")).await;
    assert_eq!(
        outcome,
        MessageOutcome::Command(Command::ImageMode(DynamicImageMode::Off))
    );
    assert_eq!(director.state().dynamic_image_mode, DynamicImageMode::Off);

    assert!(director.host().messages().is_empty());
}

#[tokio::test]
async fn test_unknown_command_is_dropped() {
    let mut director = ready_director(backend("", "")).await;

    let outcome = say(&mut director, ThreadMessage::user("/dance wildly")).await;
    assert_eq!(
        outcome,
        MessageOutcome::Command(Command::Unknown("/dance wildly".to_string()))
    );
    assert!(director.host().messages().is_empty());
    assert_eq!(director.state().user_message_counter, 0);
}

#[tokio::test]
async fn test_guidance_and_custom_image_commands() {
    let backend = backend("", "");
    let mut director = ready_director(backend.clone()).await;

    say(&mut director, ThreadMessage::user("/guidance")).await;
    say(&mut director, ThreadMessage::user("/customImage")).await;

    let messages = director.host().messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].content.contains("learn Sam's name"));
    assert_eq!(messages[0].expects_reply, Some(false));
    assert_eq!(messages[1].content, "<image>p1 a quiet garden n1</image>");
    assert_eq!(backend.calls(), vec!["scene"]);
}

#[tokio::test]
async fn test_character_message_posts_image_in_chat() {
    let backend = backend("", r#"{"mood": "sad", "place": "home"}"#);
    let mut director = ready_director(backend.clone()).await;
    director.set_dynamic_image_mode(DynamicImageMode::InChat);

    let outcome = say(&mut director, ThreadMessage::ai("*sighs and looks around*")).await;
    assert_eq!(outcome, MessageOutcome::Image);
    assert_eq!(backend.calls(), vec!["tags"]);

    let posted = system_messages(&director);
    assert_eq!(
        posted[0].content,
        r#"<img src="https://cdn.example.com/sad-home.png" style="max-width: 75vw; max-height: 110vw;">"#
    );
    assert_eq!(posted[0].hidden_from, vec![Author::Ai]);
    assert_eq!(posted[0].expects_reply, Some(false));
    // In-chat mode leaves the panel image alone.
    assert_eq!(
        director.state().current_image.as_deref(),
        Some("https://cdn.example.com/stage1.png")
    );
}

#[tokio::test]
async fn test_character_message_updates_panel_only() {
    let mut director = ready_director(backend("", r#"{"mood": "happy", "place": ""}"#)).await;
    director.set_dynamic_image_mode(DynamicImageMode::OnlyHere);

    say(&mut director, ThreadMessage::ai("*smiles*")).await;
    assert_eq!(
        director.state().current_image.as_deref(),
        Some("https://cdn.example.com/happy-park.png")
    );
    assert!(system_messages(&director).is_empty());
    assert!(!director.state().image_changing);
}

#[tokio::test]
async fn test_image_mode_off_ignores_character_messages() {
    let backend = backend("", r#"{"mood": "sad"}"#);
    let mut director = ready_director(backend.clone()).await;
    director.set_dynamic_image_mode(DynamicImageMode::Off);

    let outcome = say(&mut director, ThreadMessage::ai("*waves*")).await;
    assert_eq!(outcome, MessageOutcome::Ignored);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_empty_image_catalog_is_an_error() {
    let source = Arc::new(FakeSource::with_catalog().replace("images.json", json!([])));
    let mut director = director(
        backend("", r#"{"mood": "sad"}"#),
        source,
        MemoryHost::new("Mira", "Sam"),
    );
    director.initialize().await.unwrap();

    let message = ThreadMessage::ai("*waves*");
    director.host_mut().push_message(message.clone());
    let err = director.on_message_added(message).await.unwrap_err();
    assert!(matches!(
        err,
        DirectorError::Selection(SelectionError::NoCandidates)
    ));
    assert!(!director.state().image_changing);
}

// region: --- GitHub source

#[tokio::test]
async fn test_github_source_requests_raw_content_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/me/content/contents/chars/mira/stages.json"))
        .and(header("accept", "application/vnd.github.v3.raw"))
        .and(header("authorization", "token secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"number": 1}]"#))
        .expect(1)
        .mount(&server)
        .await;

    let source = GithubSource::new(server.uri(), "me", "content", Some("secret".to_string()));
    let value = source
        .fetch_json("chars/mira/stages.json")
        .await
        .expect("fetch");
    assert_eq!(value, json!([{ "number": 1 }]));
}

#[tokio::test]
async fn test_github_catalog_load_names_failed_resource() {
    let server = MockServer::start().await;
    for (file, body) in [("stages.json", stages_json()), ("imageTags.json", tags_json())] {
        Mock::given(method("GET"))
            .and(path(format!("/repos/me/content/contents/{BASE_PATH}/{file}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }

    let source = GithubSource::new(server.uri(), "me", "content", None);
    let err = load_catalog(&source, BASE_PATH).await.unwrap_err();
    assert!(matches!(err, DataLoadError::Failed(_)));
    assert_eq!(err.failed_resources(), vec!["images"]);
}

#[tokio::test]
async fn test_github_image_becomes_data_uri() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/content/raw/main/stage2.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"abc".to_vec()),
        )
        .mount(&server)
        .await;

    let source = GithubSource::new(server.uri(), "me", "content", None);
    let url = format!("{}/me/content/raw/main/stage2.jpg", server.uri());
    let data = fetch_image_data(&source, &url).await.unwrap();
    assert_eq!(data, "data:image/jpeg;base64,YWJj");
}

// endregion: --- GitHub source
