//! Request/response payloads

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use chat_core::domain::ChatStatus;
use chat_core::services::{ChatCompletionConfig, ChatCompletionInput, ChatCompletionOutput};

/// Body of `POST /chat` and `POST /chat/stream`
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    /// Empty or absent opens a new chat
    #[serde(default)]
    #[validate(length(max = 128, message = "chat_id is too long"))]
    pub chat_id: String,

    #[validate(length(min = 1, max = 128, message = "user_id is required"))]
    pub user_id: String,

    #[validate(length(min = 1, message = "user_message is required"))]
    pub user_message: String,

    /// Reject unknown chat ids instead of opening a new chat under them
    #[serde(default)]
    pub continue_existing: bool,
}

impl ChatRequest {
    pub fn into_input(self, config: ChatCompletionConfig) -> ChatCompletionInput {
        ChatCompletionInput {
            chat_id: self.chat_id,
            user_id: self.user_id,
            user_message: self.user_message,
            continue_existing: self.continue_existing,
            config,
        }
        .with_resolved_id()
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub chat_id: String,
    pub user_id: String,
    pub message_id: Uuid,
    pub content: String,
}

impl From<ChatCompletionOutput> for ChatResponse {
    fn from(output: ChatCompletionOutput) -> Self {
        Self {
            chat_id: output.chat_id,
            user_id: output.user_id,
            message_id: output.message_id,
            content: output.content,
        }
    }
}

/// Body of `POST /chat/end`
#[derive(Debug, Deserialize, Validate)]
pub struct EndChatRequest {
    #[validate(length(min = 1, max = 128, message = "chat_id is required"))]
    pub chat_id: String,

    #[validate(length(min = 1, max = 128, message = "user_id is required"))]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct EndChatResponse {
    pub chat_id: String,
    pub status: ChatStatus,
}
