// ============================================================================
// Chat Core - Message Entity
// File: crates/chat-core/src/domain/message.rs
// Description: Immutable conversation message with its token cost
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::model::Model;
use crate::error::DomainError;
use crate::providers::TokenCounter;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(DomainError::Validation(format!("invalid role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation message.
///
/// Fields are private: a message never changes after construction and its
/// token count is computed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    tokens: usize,
    model: String,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message, counting its tokens for `model`
    pub fn new(
        role: Role,
        content: impl Into<String>,
        model: &Model,
        counter: &dyn TokenCounter,
    ) -> Result<Self, DomainError> {
        let content = content.into();
        if content.is_empty() {
            return Err(DomainError::Validation("content is empty".to_string()));
        }

        let tokens = counter.count_tokens(model.name(), &content)?;

        let message = Self {
            id: Uuid::new_v4(),
            role,
            content,
            tokens,
            model: model.name().to_string(),
            created_at: Utc::now(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Rebuild a persisted message, keeping its stored token count
    pub fn restore(
        id: Uuid,
        role: Role,
        content: String,
        tokens: usize,
        model: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let message = Self {
            id,
            role,
            content,
            tokens,
            model,
            created_at,
        };
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.content.is_empty() {
            return Err(DomainError::Validation("content is empty".to_string()));
        }
        if self.created_at.timestamp() <= 0 {
            return Err(DomainError::Validation("invalid creation time".to_string()));
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, _model: &str, text: &str) -> Result<usize, DomainError> {
            Ok(text.split_whitespace().count())
        }
    }

    struct FailingCounter;

    impl TokenCounter for FailingCounter {
        fn count_tokens(&self, model: &str, _text: &str) -> Result<usize, DomainError> {
            Err(DomainError::Tokenization {
                model: model.to_string(),
                reason: "unknown encoding".to_string(),
            })
        }
    }

    fn model() -> Model {
        Model::new("gpt-3.5-turbo", 100).unwrap()
    }

    #[test]
    fn test_new_message_counts_tokens_once() {
        let msg = Message::new(Role::User, "how are you today", &model(), &WordCounter).unwrap();
        assert_eq!(msg.tokens(), 4);
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.model(), "gpt-3.5-turbo");
        assert!(msg.created_at().timestamp() > 0);
    }

    #[test]
    fn test_empty_content_rejected() {
        let result = Message::new(Role::User, "", &model(), &WordCounter);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_tokenizer_failure_propagates() {
        let result = Message::new(Role::User, "hello", &model(), &FailingCounter);
        assert!(matches!(result, Err(DomainError::Tokenization { .. })));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!(matches!("tool".parse::<Role>(), Err(DomainError::Validation(_))));
        assert!("User".parse::<Role>().is_err());
    }

    #[test]
    fn test_restore_rejects_missing_timestamp() {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let result = Message::restore(
            Uuid::new_v4(),
            Role::User,
            "hi".to_string(),
            1,
            "gpt-4".to_string(),
            epoch,
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
