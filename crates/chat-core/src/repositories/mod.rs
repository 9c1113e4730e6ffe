//! Repository traits (ports)

pub mod chat_repository;

pub use chat_repository::ChatRepository;

#[cfg(test)]
pub use chat_repository::MockChatRepository;
