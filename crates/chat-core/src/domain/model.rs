// ============================================================================
// Chat Core - Model Descriptor
// File: crates/chat-core/src/domain/model.rs
// Description: Provider model and generation parameters snapshot
// ============================================================================

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::DomainError;

/// Provider model with its context-token ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Model {
    #[validate(length(min = 1, message = "Model name is required"))]
    name: String,

    /// Ceiling for the combined history submitted to the provider
    #[validate(range(min = 1, message = "Model max tokens must be positive"))]
    max_tokens: usize,
}

impl Model {
    pub fn new(name: impl Into<String>, max_tokens: usize) -> Result<Self, DomainError> {
        let model = Self {
            name: name.into().trim().to_string(),
            max_tokens,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// Configuration snapshot carried by every chat.
///
/// Frozen at chat creation so older conversations stay reproducible when
/// server defaults change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ChatConfig {
    #[validate(nested)]
    pub model: Model,

    #[validate(range(min = 0.0, max = 2.0, message = "Temperature must be between 0 and 2"))]
    pub temperature: f32,

    #[validate(range(min = 0.0, max = 1.0, message = "Top-p must be between 0 and 1"))]
    pub top_p: f32,

    /// Number of completions requested
    #[validate(range(min = 1, message = "N must be at least 1"))]
    pub n: u32,

    #[serde(default)]
    pub stop: Vec<String>,

    /// Output token ceiling passed to the provider
    #[validate(range(min = 1, message = "Max tokens must be positive"))]
    pub max_tokens: u32,

    #[serde(default)]
    #[validate(range(min = -2.0, max = 2.0, message = "Presence penalty must be between -2 and 2"))]
    pub presence_penalty: f32,

    #[serde(default)]
    #[validate(range(min = -2.0, max = 2.0, message = "Frequency penalty must be between -2 and 2"))]
    pub frequency_penalty: f32,
}

impl ChatConfig {
    /// Config with provider defaults for everything but the model
    pub fn for_model(model: Model) -> Self {
        Self {
            model,
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            stop: Vec::new(),
            max_tokens: 256,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }

    pub fn ensure_valid(&self) -> Result<(), DomainError> {
        self.validate()?;
        Ok(())
    }
}
