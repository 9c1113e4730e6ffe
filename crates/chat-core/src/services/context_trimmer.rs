// ============================================================================
// Chat Core - Context Trimmer
// File: crates/chat-core/src/services/context_trimmer.rs
// Description: Keeps a chat's active history inside the model token budget
// ============================================================================

use tracing::debug;

use crate::domain::{Chat, Message};
use crate::error::DomainError;

/// Evicts the oldest non-pinned messages until the chat fits its model's
/// token budget. Eviction is one message at a time, oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextTrimmer;

impl ContextTrimmer {
    pub fn new() -> Self {
        Self
    }

    /// Enforce `token_usage <= max_tokens` in place.
    ///
    /// Fails with `ContextBudgetExceeded` before touching anything when the
    /// pinned system message alone is over the limit.
    pub fn trim<'a>(&self, chat: &'a mut Chat) -> Result<&'a mut Chat, DomainError> {
        let limit = chat.config().model.max_tokens();
        let floor = chat.initial_system_message().tokens();
        if floor > limit {
            return Err(DomainError::ContextBudgetExceeded {
                required: floor,
                limit,
            });
        }

        let mut evicted = 0usize;
        while chat.token_usage() > limit {
            if chat.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }

        if evicted > 0 {
            debug!(
                "Trimmed chat {}: evicted {} message(s), usage {}/{}",
                chat.id(),
                evicted,
                chat.token_usage(),
                limit
            );
        }
        Ok(chat)
    }

    /// Append the incoming prompt message, evicting older history first so
    /// the message itself is never a candidate.
    ///
    /// Nothing is mutated when the chat is ended or when the system message
    /// plus `message` cannot fit.
    pub fn admit(&self, chat: &mut Chat, message: Message) -> Result<(), DomainError> {
        chat.ensure_active()?;

        let limit = chat.config().model.max_tokens();
        let incoming = message.tokens();
        let required = chat.initial_system_message().tokens() + incoming;
        if required > limit {
            return Err(DomainError::ContextBudgetExceeded { required, limit });
        }

        let mut evicted = 0usize;
        while chat.token_usage() + incoming > limit {
            if chat.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            debug!(
                "Admitting {} tokens into chat {}: evicted {} message(s)",
                incoming,
                chat.id(),
                evicted
            );
        }

        chat.push_message(message)
    }

    /// Append a finished message and re-trim. The appended message is
    /// eligible for eviction like any other history entry.
    pub fn append(&self, chat: &mut Chat, message: Message) -> Result<(), DomainError> {
        chat.ensure_active()?;
        let limit = chat.config().model.max_tokens();
        let floor = chat.initial_system_message().tokens();
        if floor > limit {
            return Err(DomainError::ContextBudgetExceeded {
                required: floor,
                limit,
            });
        }

        chat.push_message(message)?;
        self.trim(chat)?;
        Ok(())
    }
}
