//! Per-conversation request serialization

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// One async mutex per chat id. A request cycle holds its chat's lock from
/// resolution to persistence, so two requests never mutate the same chat at
/// once. Entries are dropped when the last holder releases them.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

pub struct ConversationGuard {
    chat_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, chat_id: &str) -> ConversationGuard {
        let mutex = self
            .inner
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        if mutex.try_lock().is_err() {
            debug!("Waiting for in-flight request on chat {}", chat_id);
        }
        let guard = mutex.lock_owned().await;

        ConversationGuard {
            chat_id: chat_id.to_string(),
            locks: Arc::clone(&self.inner),
            guard: Some(guard),
        }
    }

    /// Number of chats with a holder or waiter
    pub fn active(&self) -> usize {
        self.inner.len()
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference
        self.guard.take();
        self.locks
            .remove_if(&self.chat_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_chat_is_serialized() {
        let locks = ConversationLocks::new();
        let first = locks.acquire("chat-1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("chat-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!contender.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_chats_do_not_block() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire("chat-a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("chat-b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn test_entries_removed_after_release() {
        let locks = ConversationLocks::new();
        {
            let _guard = locks.acquire("chat-1").await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}
