use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{Duration, timeout};

use crate::content::Replacements;
use crate::error::AdvisorError;
use crate::message::{Author, ThreadMessage};

pub const EMPTY_RESPONSE_FALLBACK: &str = "No meaningful response generated.";
pub const ERROR_RESPONSE_FALLBACK: &str = "Unable to generate response due to an error.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion capability.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AdvisorError>;
}

pub struct OpenAIBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIBackend {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(openai_config),
            model: model.into(),
        }
    }

    fn to_request_message(
        message: ChatMessage,
    ) -> Result<ChatCompletionRequestMessage, AdvisorError> {
        Ok(match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content)
                .build()?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content)
                .build()?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content)
                .build()?
                .into(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAIBackend {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AdvisorError> {
        let messages = messages
            .into_iter()
            .map(Self::to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AdvisorError::EmptyCompletion)
    }
}

/// Parameters of one advisor round.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_instruction: String,
    pub context_messages: usize,
    /// Include every author in the context, not only user and ai.
    pub all_messages: bool,
    pub additional_messages: Vec<ChatMessage>,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(system_instruction: impl Into<String>, user_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            user_instruction: user_instruction.into(),
            context_messages: 0,
            all_messages: false,
            additional_messages: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn context_messages(mut self, count: usize) -> Self {
        self.context_messages = count;
        self
    }

    pub fn all_messages(mut self, all: bool) -> Self {
        self.all_messages = all;
        self
    }

    pub fn additional_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.additional_messages = messages;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Wraps a [`CompletionBackend`] with context assembly, a timeout and fallback replies.
#[derive(Clone)]
pub struct NarrativeAdvisor {
    backend: Arc<dyn CompletionBackend>,
}

impl NarrativeAdvisor {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Flattens the last messages of the thread into one labelled context block.
    pub fn context_block(
        history: &[ThreadMessage],
        count: usize,
        all_messages: bool,
        names: &Replacements,
    ) -> String {
        let candidates: Vec<&ThreadMessage> = history
            .iter()
            .filter(|m| all_messages || m.author.is_conversational())
            .collect();
        let recent = &candidates[candidates.len().saturating_sub(count)..];

        let lines = recent
            .iter()
            .map(|m| {
                let speaker = match &m.author {
                    Author::Ai => names.character.as_str(),
                    Author::User => names.user.as_str(),
                    Author::System => "system",
                    Author::Other(name) => name.as_str(),
                };
                format!("- [{}]: {}", speaker, m.content.replace('\n', "\\n"))
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Here are the last {} messages for context:\n{}",
            recent.len(),
            lines
        )
    }

    pub fn assemble(
        request: &CompletionRequest,
        history: &[ThreadMessage],
        names: &Replacements,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(request.system_instruction.clone()),
            ChatMessage::user(request.user_instruction.clone()),
        ];
        if request.context_messages > 0 {
            messages.insert(
                1,
                ChatMessage::system(Self::context_block(
                    history,
                    request.context_messages,
                    request.all_messages,
                    names,
                )),
            );
        }
        messages.extend(request.additional_messages.iter().cloned());
        messages
    }

    /// Runs one completion. Never fails: timeouts and errors resolve to a fallback string.
    pub async fn complete(
        &self,
        request: CompletionRequest,
        history: &[ThreadMessage],
        names: &Replacements,
    ) -> String {
        let messages = Self::assemble(&request, history, names);
        log::debug!(
            "[LLM - Request] Initiating chat completion: system {} chars, user {} chars, {} context messages",
            request.system_instruction.len(),
            request.user_instruction.len(),
            request.context_messages
        );

        let result = match timeout(request.timeout, self.backend.complete(messages)).await {
            Ok(result) => result,
            Err(_) => Err(AdvisorError::Timeout),
        };

        match result {
            Ok(response) if response.trim().is_empty() => {
                log::warn!("[LLM - Response] Received empty response. Returning fallback message.");
                EMPTY_RESPONSE_FALLBACK.to_string()
            }
            Ok(response) => {
                log::debug!(
                    "[LLM - Response] Successful completion received: {} chars",
                    response.len()
                );
                response
            }
            Err(e) => {
                log::error!("[LLM - Error] Chat completion failed: {e}");
                ERROR_RESPONSE_FALLBACK.to_string()
            }
        }
    }
}
