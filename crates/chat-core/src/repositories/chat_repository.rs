//! Chat repository trait (store gateway)

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::Chat;
use crate::error::DomainError;

/// Durable chat storage.
///
/// Adapters receive complete snapshots and hand back complete snapshots;
/// nothing is shared with the caller after a call returns.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Insert a new chat with all its messages. Fails with
    /// `ChatAlreadyExists` when the id is taken.
    async fn create(&self, chat: &Chat) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Chat>, DomainError>;

    /// Overwrite the chat row, the active message set and the erased archive
    async fn save(&self, chat: &Chat) -> Result<(), DomainError>;
}
