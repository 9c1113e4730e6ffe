// ============================================================================
// Chat Core - Chat Aggregate
// File: crates/chat-core/src/domain/chat.rs
// Description: Conversation history, eviction archive and token usage
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use super::message::{Message, Role};
use super::model::ChatConfig;
use crate::error::DomainError;

/// Chat lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    #[default]
    Active,
    Ended,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::Active => "active",
            ChatStatus::Ended => "ended",
        }
    }
}

impl FromStr for ChatStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChatStatus::Active),
            "ended" => Ok(ChatStatus::Ended),
            other => Err(DomainError::Validation(format!("invalid chat status: {other}"))),
        }
    }
}

/// Conversation aggregate.
///
/// `token_usage` always equals the tokens of the pinned system message plus
/// the active `messages`. Mutation goes through [`crate::services::ContextTrimmer`]
/// so the budget is enforced on every append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    id: String,
    user_id: String,
    status: ChatStatus,
    initial_system_message: Message,
    messages: Vec<Message>,
    erased_messages: Vec<Message>,
    config: ChatConfig,
    token_usage: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted pieces of a chat, used by store adapters to rehydrate it
#[derive(Debug, Clone)]
pub struct ChatParts {
    pub id: String,
    pub user_id: String,
    pub status: ChatStatus,
    pub initial_system_message: Message,
    pub messages: Vec<Message>,
    pub erased_messages: Vec<Message>,
    pub config: ChatConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Start a new chat pinned to `initial_system_message`
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        initial_system_message: Message,
        config: ChatConfig,
    ) -> Result<Self, DomainError> {
        let now = Utc::now();
        let chat = Self {
            id: id.into(),
            user_id: user_id.into(),
            status: ChatStatus::Active,
            token_usage: initial_system_message.tokens(),
            initial_system_message,
            messages: Vec::new(),
            erased_messages: Vec::new(),
            config,
            created_at: now,
            updated_at: now,
        };
        chat.validate()?;

        let limit = chat.config.model.max_tokens();
        if chat.token_usage > limit {
            return Err(DomainError::ContextBudgetExceeded {
                required: chat.token_usage,
                limit,
            });
        }

        Ok(chat)
    }

    /// Rebuild a chat from storage. Token usage is recomputed from the
    /// active set rather than trusted.
    pub fn restore(parts: ChatParts) -> Result<Self, DomainError> {
        let mut chat = Self {
            id: parts.id,
            user_id: parts.user_id,
            status: parts.status,
            initial_system_message: parts.initial_system_message,
            messages: parts.messages,
            erased_messages: parts.erased_messages,
            config: parts.config,
            token_usage: 0,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        };
        chat.validate()?;

        let pinned = chat.initial_system_message.id();
        if chat
            .messages
            .iter()
            .chain(chat.erased_messages.iter())
            .any(|m| m.id() == pinned)
        {
            return Err(DomainError::Validation(format!(
                "chat {} stores its system message outside the pinned slot",
                chat.id
            )));
        }

        chat.refresh_token_usage();
        if chat.token_usage > chat.config.model.max_tokens() {
            warn!(
                "Restored chat {} is over budget ({} > {})",
                chat.id,
                chat.token_usage,
                chat.config.model.max_tokens()
            );
        }
        Ok(chat)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::Validation("chat id is empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(DomainError::Validation("invalid user id".to_string()));
        }
        if self.initial_system_message.role() != Role::System {
            return Err(DomainError::Validation(
                "initial message must have the system role".to_string(),
            ));
        }
        self.config.ensure_valid()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ChatStatus::Active
    }

    pub fn initial_system_message(&self) -> &Message {
        &self.initial_system_message
    }

    /// Active history, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Evicted messages, oldest evicted first
    pub fn erased_messages(&self) -> &[Message] {
        &self.erased_messages
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn token_usage(&self) -> usize {
        self.token_usage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Messages submitted to the provider: system message, then history
    pub fn prompt(&self) -> impl Iterator<Item = &Message> {
        std::iter::once(&self.initial_system_message).chain(self.messages.iter())
    }

    /// End the chat; later appends fail with `ChatEnded`
    pub fn end(&mut self) {
        self.status = ChatStatus::Ended;
        self.updated_at = Utc::now();
    }

    pub(crate) fn ensure_active(&self) -> Result<(), DomainError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::ChatEnded(self.id.clone()))
        }
    }

    pub(crate) fn push_message(&mut self, message: Message) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.messages.push(message);
        self.refresh_token_usage();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move the oldest active message to the archive. Returns its token cost.
    pub(crate) fn evict_oldest(&mut self) -> Option<usize> {
        if self.messages.is_empty() {
            return None;
        }
        let evicted = self.messages.remove(0);
        let tokens = evicted.tokens();
        self.erased_messages.push(evicted);
        self.refresh_token_usage();
        self.updated_at = Utc::now();
        Some(tokens)
    }

    fn refresh_token_usage(&mut self) {
        self.token_usage = self.initial_system_message.tokens()
            + self.messages.iter().map(Message::tokens).sum::<usize>();
    }
}
