use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use chat_api::{build_router, AppState};
use chat_core::providers::{CompletionProvider, TokenCounter};
use chat_core::repositories::ChatRepository;
use chat_core::services::ChatCompletionService;
use chat_infrastructure::{
    create_pool, run_migrations, InMemoryChatRepository, OpenAiCompletionProvider,
    PgChatRepository, TiktokenCounter,
};
use chat_shared::config::{AppConfig, DatabaseBackend, DatabaseSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize telemetry (guard flushes file logs on exit)
    let _log_guard = chat_shared::telemetry::init_telemetry(&config.log)?;

    info!("Chat Server starting...");

    let completion_config = config.chat.completion_config()?;
    info!(
        "Model {} with a {}-token context budget",
        completion_config.chat.model.name(),
        completion_config.chat.model.max_tokens()
    );

    // Store
    let repository = build_repository(&config.database).await?;

    // Provider and tokenizer are shared read-only by every request
    if config.llm.api_key.is_empty() {
        warn!("llm.api_key is empty; provider calls are sent without authorization");
    }
    let provider: Arc<dyn CompletionProvider> = Arc::new(OpenAiCompletionProvider::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        Duration::from_secs(config.llm.timeout_seconds),
    )?);
    let counter: Arc<dyn TokenCounter> = Arc::new(TiktokenCounter::new());

    let chat_service = Arc::new(ChatCompletionService::new(repository, provider, counter));
    let state = AppState::new(chat_service, completion_config, &config.server);
    let app = build_router(state);

    // Start server
    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Chat Server stopped");
    Ok(())
}

async fn build_repository(settings: &DatabaseSettings) -> anyhow::Result<Arc<dyn ChatRepository>> {
    match settings.backend {
        DatabaseBackend::Postgres => {
            info!("Connecting to database...");
            let pool = create_pool(
                &settings.url,
                settings.max_connections,
                settings.min_connections,
                settings.acquire_timeout_seconds,
            )
            .await?;
            info!("Database connection established.");

            if settings.run_migrations {
                run_migrations(&pool).await?;
            }
            Ok(Arc::new(PgChatRepository::new(pool)))
        }
        DatabaseBackend::Memory => {
            warn!("Using in-memory chat store; chats are lost on restart");
            Ok(Arc::new(InMemoryChatRepository::new()))
        }
    }
}

async fn shutdown_signal() {
    wait_for_shutdown(signal::ctrl_c()).await
}

/// Resolves when `signal` fires. A listener that fails never resolves, so
/// the server keeps serving instead of stopping right after startup.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
