//! Domain errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tokenization error for model {model}: {reason}")]
    Tokenization { model: String, reason: String },

    #[error("Context budget exceeded: {required} tokens required, limit is {limit}")]
    ContextBudgetExceeded { required: usize, limit: usize },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Chat already exists: {0}")]
    ChatAlreadyExists(String),

    #[error("Chat is ended, no more messages allowed: {0}")]
    ChatEnded(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl DomainError {
    /// Stable machine-readable code, shared by HTTP responses and stream events.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::Tokenization { .. } => "TOKENIZATION_ERROR",
            DomainError::ContextBudgetExceeded { .. } => "CONTEXT_BUDGET_EXCEEDED",
            DomainError::Provider(_) => "PROVIDER_ERROR",
            DomainError::ChatNotFound(_) => "NOT_FOUND",
            DomainError::ChatAlreadyExists(_) => "CHAT_ALREADY_EXISTS",
            DomainError::ChatEnded(_) => "CHAT_ENDED",
            DomainError::Persistence(_) => "PERSISTENCE_ERROR",
            DomainError::Cancelled => "CANCELLED",
        }
    }

    /// Store failures. When raised after the provider call the reply was
    /// generated but not durably saved.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            DomainError::Persistence(_) | DomainError::ChatAlreadyExists(_)
        )
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::Validation(errors.to_string())
    }
}
