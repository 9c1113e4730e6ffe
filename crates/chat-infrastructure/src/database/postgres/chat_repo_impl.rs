// ============================================================================
// Chat Infrastructure - PostgreSQL Chat Repository
// File: crates/chat-infrastructure/src/database/postgres/chat_repo_impl.rs
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, error, info};
use uuid::Uuid;

use chat_core::domain::{Chat, ChatConfig, ChatParts, ChatStatus, Message, Model, Role};
use chat_core::error::DomainError;
use chat_core::repositories::ChatRepository;

pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal row types for SQLx mapping
#[derive(Debug, FromRow)]
struct ChatRow {
    pub id: String,
    pub user_id: String,
    pub initial_message_id: Uuid,
    pub status: String,
    pub model: String,
    pub model_max_tokens: i32,
    pub temperature: f32,
    pub top_p: f32,
    pub n: i32,
    pub stop: Vec<String>,
    pub max_tokens: i32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub tokens: i32,
    pub model: String,
    pub erased: bool,
    pub created_at: DateTime<Utc>,
}

fn corrupt(chat_id: &str, reason: impl std::fmt::Display) -> DomainError {
    DomainError::Persistence(format!("stored chat {} is invalid: {}", chat_id, reason))
}

fn to_count(chat_id: &str, value: i32) -> Result<usize, DomainError> {
    usize::try_from(value).map_err(|_| corrupt(chat_id, format!("negative count {}", value)))
}

fn to_db_int<T>(value: T) -> Result<i32, DomainError>
where
    T: Copy + std::fmt::Display,
    i32: TryFrom<T>,
{
    i32::try_from(value)
        .map_err(|_| DomainError::Persistence(format!("value {} does not fit the schema", value)))
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    error!("Database error {}: {}", context, e);
    DomainError::Persistence(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl MessageRow {
    fn into_message(self, chat_id: &str) -> Result<Message, DomainError> {
        let role: Role = self.role.parse().map_err(|e| corrupt(chat_id, e))?;
        let tokens = to_count(chat_id, self.tokens)?;
        Message::restore(self.id, role, self.content, tokens, self.model, self.created_at)
            .map_err(|e| corrupt(chat_id, e))
    }
}

/// Rebuild the aggregate from its rows. `messages` must be ordered by `order_msg`.
fn assemble_chat(row: ChatRow, messages: Vec<MessageRow>) -> Result<Chat, DomainError> {
    let chat_id = row.id.clone();
    let status: ChatStatus = row.status.parse().map_err(|e| corrupt(&chat_id, e))?;

    let model = Model::new(row.model, to_count(&chat_id, row.model_max_tokens)?)
        .map_err(|e| corrupt(&chat_id, e))?;
    let config = ChatConfig {
        model,
        temperature: row.temperature,
        top_p: row.top_p,
        n: u32::try_from(row.n).map_err(|_| corrupt(&chat_id, "negative n"))?,
        stop: row.stop,
        max_tokens: u32::try_from(row.max_tokens)
            .map_err(|_| corrupt(&chat_id, "negative max_tokens"))?,
        presence_penalty: row.presence_penalty,
        frequency_penalty: row.frequency_penalty,
    };

    let mut initial = None;
    let mut active = Vec::new();
    let mut erased = Vec::new();
    for message_row in messages {
        let is_initial = message_row.id == row.initial_message_id;
        let is_erased = message_row.erased;
        let message = message_row.into_message(&chat_id)?;
        if is_initial {
            initial = Some(message);
        } else if is_erased {
            erased.push(message);
        } else {
            active.push(message);
        }
    }
    let initial_system_message =
        initial.ok_or_else(|| corrupt(&chat_id, "initial system message is missing"))?;

    Chat::restore(ChatParts {
        id: row.id,
        user_id: row.user_id,
        status,
        initial_system_message,
        messages: active,
        erased_messages: erased,
        config,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
    .map_err(|e| corrupt(&chat_id, e))
}

/// Storage order: initial message at 0, active history from 1, then the
/// erased archive. Returns (message, erased, order_msg).
fn storage_order(chat: &Chat) -> Vec<(&Message, bool, i32)> {
    let mut rows = Vec::with_capacity(1 + chat.messages().len() + chat.erased_messages().len());
    rows.push((chat.initial_system_message(), false, 0));
    let history = chat
        .messages()
        .iter()
        .map(|m| (m, false))
        .chain(chat.erased_messages().iter().map(|m| (m, true)));
    for (index, (message, erased)) in history.enumerate() {
        rows.push((message, erased, index as i32 + 1));
    }
    rows
}

impl PgChatRepository {
    async fn insert_messages(
        tx: &mut Transaction<'_, Postgres>,
        chat: &Chat,
        skip_initial: bool,
    ) -> Result<(), DomainError> {
        for (message, erased, order_msg) in storage_order(chat) {
            if skip_initial && order_msg == 0 {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO messages (
                    id, chat_id, role, content, tokens, model,
                    erased, order_msg, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(message.id())
            .bind(chat.id())
            .bind(message.role().as_str())
            .bind(message.content())
            .bind(to_db_int(message.tokens())?)
            .bind(message.model())
            .bind(erased)
            .bind(order_msg)
            .bind(message.created_at())
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("inserting message", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn create(&self, chat: &Chat) -> Result<(), DomainError> {
        let config = chat.config();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("opening transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO chats (
                id, user_id, initial_message_id, status, token_usage,
                model, model_max_tokens, temperature, top_p, n, stop,
                max_tokens, presence_penalty, frequency_penalty,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(chat.id())
        .bind(chat.user_id())
        .bind(chat.initial_system_message().id())
        .bind(chat.status().as_str())
        .bind(to_db_int(chat.token_usage())?)
        .bind(config.model.name())
        .bind(to_db_int(config.model.max_tokens())?)
        .bind(config.temperature)
        .bind(config.top_p)
        .bind(to_db_int(config.n)?)
        .bind(&config.stop)
        .bind(to_db_int(config.max_tokens)?)
        .bind(config.presence_penalty)
        .bind(config.frequency_penalty)
        .bind(chat.created_at())
        .bind(chat.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::ChatAlreadyExists(chat.id().to_string())
            } else {
                db_error("creating chat", e)
            }
        })?;

        Self::insert_messages(&mut tx, chat, false).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("committing chat creation", e))?;

        info!("Chat created: {} for user {}", chat.id(), chat.user_id());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Chat>, DomainError> {
        let row: Option<ChatRow> = sqlx::query_as(
            r#"
            SELECT
                id, user_id, initial_message_id, status,
                model, model_max_tokens, temperature, top_p, n, stop,
                max_tokens, presence_penalty, frequency_penalty,
                created_at, updated_at
            FROM chats
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("finding chat by id", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, role, content, tokens, model, erased, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY order_msg ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("loading chat messages", e))?;

        debug!("Loaded chat {} with {} stored messages", id, messages.len());
        assemble_chat(row, messages).map(Some)
    }

    async fn save(&self, chat: &Chat) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("opening transaction", e))?;

        let result = sqlx::query(
            r#"
            UPDATE chats
            SET status = $2,
                token_usage = $3,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(chat.id())
        .bind(chat.status().as_str())
        .bind(to_db_int(chat.token_usage())?)
        .bind(chat.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("updating chat", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ChatNotFound(chat.id().to_string()));
        }

        sqlx::query("DELETE FROM messages WHERE chat_id = $1 AND id <> $2")
            .bind(chat.id())
            .bind(chat.initial_system_message().id())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("clearing chat messages", e))?;

        Self::insert_messages(&mut tx, chat, true).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("committing chat save", e))?;

        debug!(
            "Chat saved: {} ({} active, {} erased)",
            chat.id(),
            chat.messages().len(),
            chat.erased_messages().len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::providers::TokenCounter;
    use chat_core::services::ContextTrimmer;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, _model: &str, text: &str) -> Result<usize, DomainError> {
            Ok(text.split_whitespace().count())
        }
    }

    fn sample_chat() -> Chat {
        let config = ChatConfig::for_model(Model::new("gpt-3.5-turbo", 12).unwrap());
        let model = config.model.clone();
        let system = Message::new(Role::System, "be brief", &model, &WordCounter).unwrap();
        let mut chat = Chat::new("chat-1", "user-1", system, config).unwrap();
        let trimmer = ContextTrimmer::new();
        for text in ["one two three four five", "six seven eight", "nine ten eleven twelve thirteen"] {
            let m = Message::new(Role::User, text, &model, &WordCounter).unwrap();
            trimmer.append(&mut chat, m).unwrap();
        }
        chat
    }

    fn rows_of(chat: &Chat) -> (ChatRow, Vec<MessageRow>) {
        let config = chat.config();
        let chat_row = ChatRow {
            id: chat.id().to_string(),
            user_id: chat.user_id().to_string(),
            initial_message_id: chat.initial_system_message().id(),
            status: chat.status().as_str().to_string(),
            model: config.model.name().to_string(),
            model_max_tokens: config.model.max_tokens() as i32,
            temperature: config.temperature,
            top_p: config.top_p,
            n: config.n as i32,
            stop: config.stop.clone(),
            max_tokens: config.max_tokens as i32,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
            created_at: chat.created_at(),
            updated_at: chat.updated_at(),
        };
        let message_rows = storage_order(chat)
            .into_iter()
            .map(|(m, erased, _)| MessageRow {
                id: m.id(),
                role: m.role().as_str().to_string(),
                content: m.content().to_string(),
                tokens: m.tokens() as i32,
                model: m.model().to_string(),
                erased,
                created_at: m.created_at(),
            })
            .collect();
        (chat_row, message_rows)
    }

    #[test]
    fn test_storage_order_pins_initial_message() {
        let chat = sample_chat();
        let order = storage_order(&chat);

        assert_eq!(order[0].0.id(), chat.initial_system_message().id());
        assert_eq!(order[0].2, 0);
        let numbers: Vec<i32> = order.iter().map(|(_, _, n)| *n).collect();
        assert_eq!(numbers, (0..order.len() as i32).collect::<Vec<_>>());

        let erased_flags: Vec<bool> = order[1..].iter().map(|(_, e, _)| *e).collect();
        let active = chat.messages().len();
        assert!(erased_flags[..active].iter().all(|e| !e));
        assert!(erased_flags[active..].iter().all(|e| *e));
    }

    #[test]
    fn test_assemble_restores_equivalent_chat() {
        let chat = sample_chat();
        assert!(!chat.erased_messages().is_empty());

        let (row, messages) = rows_of(&chat);
        let restored = assemble_chat(row, messages).unwrap();
        assert_eq!(restored, chat);
    }

    #[test]
    fn test_assemble_rejects_unknown_role() {
        let chat = sample_chat();
        let (row, mut messages) = rows_of(&chat);
        messages[1].role = "tool".to_string();
        assert!(matches!(
            assemble_chat(row, messages),
            Err(DomainError::Persistence(_))
        ));
    }

    #[test]
    fn test_assemble_rejects_unknown_status() {
        let chat = sample_chat();
        let (mut row, messages) = rows_of(&chat);
        row.status = "archived".to_string();
        assert!(matches!(
            assemble_chat(row, messages),
            Err(DomainError::Persistence(_))
        ));
    }

    #[test]
    fn test_config_values_outside_schema_are_rejected() {
        assert_eq!(to_db_int(300u32).unwrap(), 300);
        assert_eq!(to_db_int(i32::MAX as u32).unwrap(), i32::MAX);
        assert!(matches!(to_db_int(u32::MAX), Err(DomainError::Persistence(_))));
        assert!(matches!(
            to_db_int(i32::MAX as usize + 1),
            Err(DomainError::Persistence(_))
        ));
    }

    #[test]
    fn test_assemble_requires_initial_message() {
        let chat = sample_chat();
        let (row, mut messages) = rows_of(&chat);
        messages.remove(0);
        assert!(matches!(
            assemble_chat(row, messages),
            Err(DomainError::Persistence(_))
        ));
    }
}
