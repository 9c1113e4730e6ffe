use std::sync::Arc;
use std::time::Duration;

use chat_core::services::{ChatCompletionConfig, ChatCompletionService};
use chat_shared::config::ServerSettings;

use crate::locks::ConversationLocks;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatCompletionService>,
    /// Model and system prompt used when a request opens a new chat
    pub completion_config: Arc<ChatCompletionConfig>,
    pub auth_token: Arc<str>,
    pub request_timeout: Duration,
    pub stream_buffer_size: usize,
    pub locks: ConversationLocks,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatCompletionService>,
        completion_config: ChatCompletionConfig,
        server: &ServerSettings,
    ) -> Self {
        Self {
            chat_service,
            completion_config: Arc::new(completion_config),
            auth_token: Arc::from(server.auth_token.as_str()),
            request_timeout: Duration::from_secs(server.request_timeout_seconds),
            stream_buffer_size: server.stream_buffer_size.max(1),
            locks: ConversationLocks::new(),
        }
    }
}
