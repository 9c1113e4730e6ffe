//! # Chat API
//!
//! HTTP handlers, bearer-token middleware, DTOs and per-conversation locks.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod middleware;
pub mod response;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
