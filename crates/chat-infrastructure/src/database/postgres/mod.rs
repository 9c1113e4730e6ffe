//! PostgreSQL repository implementations

pub mod chat_repo_impl;

pub use chat_repo_impl::PgChatRepository;
