//! # Chat Shared
//!
//! Configuration loading, telemetry and bootstrap errors shared by the
//! chat server crates.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::AppConfig;
pub use error::AppError;
