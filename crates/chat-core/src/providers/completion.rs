use async_trait::async_trait;
use futures::stream::Stream;
use serde::Serialize;
use std::pin::Pin;

use crate::domain::{Chat, Role};
use crate::error::DomainError;

/// Incremental provider output. The stream ending (`None`) is the terminal
/// marker; an `Err` item means the stream terminated abnormally.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, DomainError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// Everything the provider needs for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    pub stop: Vec<String>,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl CompletionRequest {
    /// Prompt = pinned system message followed by the active history
    pub fn from_chat(chat: &Chat) -> Self {
        let config = chat.config();
        Self {
            model: config.model.name().to_string(),
            messages: chat
                .prompt()
                .map(|m| PromptMessage {
                    role: m.role(),
                    content: m.content().to_string(),
                })
                .collect(),
            temperature: config.temperature,
            top_p: config.top_p,
            n: config.n,
            stop: config.stop.clone(),
            max_tokens: config.max_tokens,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
        }
    }
}

/// External LLM provider
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Wait for the full completion text
    async fn complete(&self, request: CompletionRequest) -> Result<String, DomainError>;

    /// Start a streamed completion
    async fn complete_stream(&self, request: CompletionRequest)
        -> Result<FragmentStream, DomainError>;
}
