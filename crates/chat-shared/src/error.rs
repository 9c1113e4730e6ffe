//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Telemetry error: {0}")]
    TelemetryError(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidConfig(errors.to_string())
    }
}

impl From<chat_core::DomainError> for AppError {
    fn from(err: chat_core::DomainError) -> Self {
        AppError::InvalidConfig(err.to_string())
    }
}
