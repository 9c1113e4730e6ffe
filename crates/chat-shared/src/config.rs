//! Configuration management

use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

use chat_core::domain::{ChatConfig, Model};
use chat_core::services::ChatCompletionConfig;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerSettings,
    #[validate(nested)]
    pub database: DatabaseSettings,
    #[validate(nested)]
    pub llm: LlmSettings,
    pub chat: ChatSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Shared secret expected as `Authorization: Bearer <token>`
    #[validate(length(min = 1, message = "server.auth_token must be set"))]
    pub auth_token: String,
    #[validate(range(min = 1))]
    pub request_timeout_seconds: u64,
    /// Capacity of the per-request fragment channel
    #[validate(range(min = 1))]
    pub stream_buffer_size: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Validate)]
#[validate(schema(function = "validate_database"))]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    #[serde(default)]
    pub url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub run_migrations: bool,
}

fn validate_database(settings: &DatabaseSettings) -> Result<(), validator::ValidationError> {
    if settings.backend == DatabaseBackend::Postgres && settings.url.trim().is_empty() {
        return Err(validator::ValidationError::new("database_url_required"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct LlmSettings {
    #[validate(length(min = 1))]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
}

/// Model and generation defaults applied to newly opened chats
#[derive(Debug, Deserialize, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub model_max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    #[serde(default)]
    pub stop: Vec<String>,
    pub max_tokens: u32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    pub initial_system_message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_log_prefix(),
        }
    }
}

fn default_log_prefix() -> String {
    "chat-server".to_string()
}

impl ChatSettings {
    /// Validated snapshot handed to the orchestrator for new chats
    pub fn completion_config(&self) -> Result<ChatCompletionConfig, AppError> {
        let chat = ChatConfig {
            model: Model::new(self.model.clone(), self.model_max_tokens)?,
            temperature: self.temperature,
            top_p: self.top_p,
            n: self.n,
            stop: self.stop.clone(),
            max_tokens: self.max_tokens,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        };
        let config = ChatCompletionConfig {
            chat,
            initial_system_message: self.initial_system_message.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl AppConfig {
    /// Load from `config/default`, `config/{APP_ENV}` and `APP__SECTION__KEY`
    /// environment variables, in increasing priority.
    pub fn load() -> Result<Self, AppError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("chat.stop")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.auth_token", "")?
            .set_default("server.request_timeout_seconds", 120)?
            .set_default("server.stream_buffer_size", 32)?
            .set_default("database.backend", "postgres")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_seconds", 3)?
            .set_default("database.run_migrations", true)?
            .set_default("llm.base_url", "https://api.openai.com")?
            .set_default("llm.timeout_seconds", 60)?
            .set_default("chat.model", "gpt-3.5-turbo")?
            .set_default("chat.model_max_tokens", 4096)?
            .set_default("chat.temperature", 0.1)?
            .set_default("chat.top_p", 1.0)?
            .set_default("chat.n", 1)?
            .set_default("chat.max_tokens", 300)?
            .set_default(
                "chat.initial_system_message",
                "You are a helpful assistant. Answer clearly and concisely.",
            )
    }

    fn from_config(config: Config) -> Result<Self, AppError> {
        let settings: AppConfig = config.try_deserialize()?;
        settings.validate()?;
        settings.chat.completion_config()?;
        Ok(settings)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
