//! # Chat Core
//!
//! Conversation aggregate, context trimming, completion orchestration and the
//! ports (store gateway, completion provider, token counter) they depend on.

pub mod domain;
pub mod error;
pub mod providers;
pub mod repositories;
pub mod services;

// Re-export domain entities
pub use domain::*;
pub use error::DomainError;
