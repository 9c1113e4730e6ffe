//! In-process chat store for local runs and tests

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use chat_core::domain::Chat;
use chat_core::error::DomainError;
use chat_core::repositories::ChatRepository;

/// Chat store keyed by chat id. Holds owned snapshots, so callers never
/// share state with the store.
#[derive(Default)]
pub struct InMemoryChatRepository {
    chats: DashMap<String, Chat>,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn create(&self, chat: &Chat) -> Result<(), DomainError> {
        match self.chats.entry(chat.id().to_string()) {
            Entry::Occupied(_) => Err(DomainError::ChatAlreadyExists(chat.id().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(chat.clone());
                debug!("Chat created in memory: {}", chat.id());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Chat>, DomainError> {
        Ok(self.chats.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, chat: &Chat) -> Result<(), DomainError> {
        match self.chats.get_mut(chat.id()) {
            Some(mut entry) => {
                *entry = chat.clone();
                Ok(())
            }
            None => Err(DomainError::ChatNotFound(chat.id().to_string())),
        }
    }
}
