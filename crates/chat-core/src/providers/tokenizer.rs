use crate::error::DomainError;

/// Token codec for a model.
///
/// Pure and synchronous: the same `(model, text)` pair always yields the
/// same count.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, model: &str, text: &str) -> Result<usize, DomainError>;
}
