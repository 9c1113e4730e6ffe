//! Request/response types of the completion orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::domain::ChatConfig;
use crate::error::DomainError;

/// Server-side settings used when a request opens a new chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChatCompletionConfig {
    #[validate(nested)]
    pub chat: ChatConfig,

    /// Boilerplate pinned as the chat's system message
    #[validate(length(min = 1, message = "Initial system message is required"))]
    pub initial_system_message: String,
}

/// One completion request
#[derive(Debug, Clone, Validate)]
pub struct ChatCompletionInput {
    /// Conversation key; empty means "start a new chat"
    pub chat_id: String,

    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    #[validate(length(min = 1, message = "User message is required"))]
    pub user_message: String,

    /// Fail with `ChatNotFound` instead of opening a chat under an unknown key
    pub continue_existing: bool,

    #[validate(nested)]
    pub config: ChatCompletionConfig,
}

impl ChatCompletionInput {
    /// Assign a fresh UUID when the caller did not supply a key
    pub fn with_resolved_id(mut self) -> Self {
        if self.chat_id.trim().is_empty() {
            self.chat_id = Uuid::new_v4().to_string();
        }
        self
    }
}

/// Blocking completion result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionOutput {
    pub chat_id: String,
    pub user_id: String,
    pub message_id: Uuid,
    pub content: String,
}

/// Events emitted on the per-request stream channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatStreamChunk {
    /// One provider fragment, forwarded as soon as it arrives
    Message {
        chat_id: String,
        user_id: String,
        content: String,
    },
    /// Terminal: the reply was finalized and persisted
    Done {
        chat_id: String,
        user_id: String,
        message_id: Uuid,
    },
    /// Terminal: the cycle failed
    Error {
        chat_id: String,
        user_id: String,
        code: String,
        message: String,
    },
}

impl ChatStreamChunk {
    pub fn error(chat_id: &str, user_id: &str, err: &DomainError) -> Self {
        ChatStreamChunk::Error {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatStreamChunk::Message { .. })
    }
}

/// Steps of one request cycle, used for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStage {
    Resolving,
    TrimmingPre,
    CallingProvider,
    StreamingFragments,
    Finalizing,
    TrimmingPost,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompletionStage::Resolving => "resolving",
            CompletionStage::TrimmingPre => "trimming_pre",
            CompletionStage::CallingProvider => "calling_provider",
            CompletionStage::StreamingFragments => "streaming_fragments",
            CompletionStage::Finalizing => "finalizing",
            CompletionStage::TrimmingPost => "trimming_post",
            CompletionStage::Persisting => "persisting",
            CompletionStage::Done => "done",
            CompletionStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_chunk_wire_shape() {
        let chunk = ChatStreamChunk::Message {
            chat_id: "c".to_string(),
            user_id: "u".to_string(),
            content: "Hel".to_string(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["content"], "Hel");
        assert!(!chunk.is_terminal());

        let err = ChatStreamChunk::error("c", "u", &DomainError::Cancelled);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["code"], "CANCELLED");
        assert!(err.is_terminal());
    }

    #[test]
    fn test_empty_chat_id_gets_uuid() {
        let config = ChatCompletionConfig {
            chat: ChatConfig::for_model(crate::domain::Model::new("gpt-4", 10).unwrap()),
            initial_system_message: "hi".to_string(),
        };
        let input = ChatCompletionInput {
            chat_id: " ".to_string(),
            user_id: "u".to_string(),
            user_message: "m".to_string(),
            continue_existing: false,
            config,
        }
        .with_resolved_id();
        assert!(Uuid::parse_str(&input.chat_id).is_ok());
    }
}
