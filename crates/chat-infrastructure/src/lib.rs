//! # Chat Infrastructure
//!
//! Adapters behind the chat-core ports: PostgreSQL and in-memory chat
//! stores, the OpenAI-compatible completion provider and the tiktoken
//! token counter.

pub mod database;
pub mod llm;
pub mod tokenizer;

pub use database::{create_pool, run_migrations, InMemoryChatRepository, PgChatRepository};
pub use llm::OpenAiCompletionProvider;
pub use tokenizer::TiktokenCounter;
