//! BPE token counting with tiktoken

use dashmap::DashMap;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::debug;

use chat_core::error::DomainError;
use chat_core::providers::TokenCounter;

/// Counts tokens with the encoding of the named model. Encoders are
/// loaded once per model name and shared afterwards.
#[derive(Default)]
pub struct TiktokenCounter {
    encoders: DashMap<String, Arc<CoreBPE>>,
}

impl TiktokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoder(&self, model: &str) -> Result<Arc<CoreBPE>, DomainError> {
        if let Some(bpe) = self.encoders.get(model) {
            return Ok(Arc::clone(bpe.value()));
        }

        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| DomainError::Tokenization {
            model: model.to_string(),
            reason: e.to_string(),
        })?;
        debug!("Loaded tokenizer for model {}", model);

        let bpe = Arc::new(bpe);
        self.encoders.insert(model.to_string(), Arc::clone(&bpe));
        Ok(bpe)
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, model: &str, text: &str) -> Result<usize, DomainError> {
        let bpe = self.encoder(model)?;
        Ok(bpe.encode_with_special_tokens(text).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_known_model() {
        let counter = TiktokenCounter::new();
        assert_eq!(counter.count_tokens("gpt-3.5-turbo", "hello world").unwrap(), 2);
        assert_eq!(counter.count_tokens("gpt-3.5-turbo", "").unwrap(), 0);
    }

    #[test]
    fn test_encoder_is_cached() {
        let counter = TiktokenCounter::new();
        counter.count_tokens("gpt-4", "a").unwrap();
        counter.count_tokens("gpt-4", "b").unwrap();
        assert_eq!(counter.encoders.len(), 1);
    }

    #[test]
    fn test_unknown_model_fails() {
        let counter = TiktokenCounter::new();
        let err = counter
            .count_tokens("definitely-not-a-model", "hi")
            .unwrap_err();
        assert!(matches!(err, DomainError::Tokenization { .. }));
    }
}
