//! # Chat Core - Domain Module
//!
//! Messages, model descriptors and the chat aggregate.

pub mod chat;
pub mod message;
pub mod model;

pub use chat::{Chat, ChatParts, ChatStatus};
pub use message::{Message, Role};
pub use model::{ChatConfig, Model};
