//! Route table

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::handlers;
use crate::middleware::require_bearer;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    // Protected routes (bearer token)
    let protected_routes = Router::new()
        .route("/chat", post(handlers::chat::chat_handler))
        .route("/chat/stream", post(handlers::stream::chat_stream_handler))
        .route("/chat/end", post(handlers::chat::end_chat_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use futures::stream;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use chat_core::domain::{ChatConfig, Model};
    use chat_core::error::DomainError;
    use chat_core::providers::{CompletionProvider, CompletionRequest, FragmentStream, TokenCounter};
    use chat_core::repositories::ChatRepository;
    use chat_core::services::{ChatCompletionConfig, ChatCompletionService};
    use chat_infrastructure::InMemoryChatRepository;

    use crate::locks::ConversationLocks;

    const TOKEN: &str = "secret-token";

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, _model: &str, text: &str) -> Result<usize, DomainError> {
            Ok(text.split_whitespace().count())
        }
    }

    enum Reply {
        Text(&'static str),
        Fragments(Vec<&'static str>),
        Fail,
        Hang,
    }

    struct ScriptedProvider(Reply);

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, DomainError> {
            match &self.0 {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fragments(parts) => Ok(parts.concat()),
                Reply::Fail => Err(DomainError::Provider("upstream unavailable".to_string())),
                Reply::Hang => std::future::pending().await,
            }
        }

        async fn complete_stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<FragmentStream, DomainError> {
            match &self.0 {
                Reply::Text(text) => Ok(Box::pin(stream::iter(vec![Ok::<_, DomainError>(
                    text.to_string(),
                )]))),
                Reply::Fragments(parts) => Ok(Box::pin(stream::iter(
                    parts
                        .iter()
                        .map(|p| Ok::<_, DomainError>(p.to_string()))
                        .collect::<Vec<_>>(),
                ))),
                Reply::Fail => Err(DomainError::Provider("upstream unavailable".to_string())),
                Reply::Hang => Ok(Box::pin(stream::pending::<Result<String, DomainError>>())),
            }
        }
    }

    fn app_with(reply: Reply, timeout: Duration) -> (Router, Arc<InMemoryChatRepository>) {
        let repo = Arc::new(InMemoryChatRepository::new());
        let service = ChatCompletionService::new(
            repo.clone() as Arc<dyn ChatRepository>,
            Arc::new(ScriptedProvider(reply)),
            Arc::new(WordCounter),
        );
        let completion_config = ChatCompletionConfig {
            chat: ChatConfig::for_model(Model::new("gpt-3.5-turbo", 100).unwrap()),
            initial_system_message: "You are a helpful assistant".to_string(),
        };
        let state = AppState {
            chat_service: Arc::new(service),
            completion_config: Arc::new(completion_config),
            auth_token: Arc::from(TOKEN),
            request_timeout: timeout,
            stream_buffer_size: 4,
            locks: ConversationLocks::new(),
        };
        (build_router(state), repo)
    }

    fn app(reply: Reply) -> (Router, Arc<InMemoryChatRepository>) {
        app_with(reply, Duration::from_secs(5))
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn chat_body(chat_id: &str, message: &str) -> Value {
        serde_json::json!({
            "chat_id": chat_id,
            "user_id": "user-1",
            "user_message": message
        })
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _) = app(Reply::Text("unused"));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_requires_bearer_token() {
        let (app, repo) = app(Reply::Text("hi"));

        let missing = app
            .clone()
            .oneshot(post("/chat", None, chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(post("/chat", Some("nope"), chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(wrong).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_chat_returns_reply_and_persists() {
        let (app, repo) = app(Reply::Text("Hello there"));

        let response = app
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["chat_id"], "c1");
        assert_eq!(body["data"]["user_id"], "user-1");
        assert_eq!(body["data"]["content"], "Hello there");

        let chat = repo.find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(chat.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_rejects_invalid_body() {
        let (app, _) = app(Reply::Text("unused"));

        let empty = app
            .clone()
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", "")))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(empty).await["error"]["code"], "VALIDATION_ERROR");

        let malformed = app
            .oneshot(post("/chat", Some(TOKEN), serde_json::json!({"user_id": 5})))
            .await
            .unwrap();
        assert!(malformed.status().is_client_error());
    }

    #[tokio::test]
    async fn test_continue_unknown_chat_is_404() {
        let (app, _) = app(Reply::Text("unused"));
        let mut body = chat_body("missing", "hello");
        body["continue_existing"] = Value::Bool(true);

        let response = app.oneshot(post("/chat", Some(TOKEN), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_failure_is_503() {
        let (app, repo) = app(Reply::Fail);
        let response = app
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"]["code"], "PROVIDER_ERROR");
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_message_is_422() {
        let (app, repo) = app(Reply::Text("unused"));
        let huge = vec!["w"; 150].join(" ");
        let response = app
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", &huge)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_request_deadline_cancels_cycle() {
        let (app, repo) = app_with(Reply::Hang, Duration::from_millis(50));
        let response = app
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(json_body(response).await["error"]["code"], "CANCELLED");
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_stream_emits_fragments_then_done() {
        let (app, repo) = app(Reply::Fragments(vec!["Hel", "lo", "!"]));
        let response = app
            .oneshot(post("/chat/stream", Some(TOKEN), chat_body("c1", "greet me")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let body = text_body(response).await;
        let events: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("event: "))
            .collect();
        assert_eq!(events, vec!["message", "message", "message", "done"]);

        let hel = body.find(r#""content":"Hel""#).unwrap();
        let lo = body.find(r#""content":"lo""#).unwrap();
        let bang = body.find(r#""content":"!""#).unwrap();
        assert!(hel < lo && lo < bang);

        let chat = repo.find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(chat.messages().last().unwrap().content(), "Hello!");
    }

    #[tokio::test]
    async fn test_stream_failure_emits_single_error_event() {
        let (app, repo) = app(Reply::Fail);
        let response = app
            .oneshot(post("/chat/stream", Some(TOKEN), chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = text_body(response).await;
        let events: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("event: "))
            .collect();
        assert_eq!(events, vec!["error"]);
        assert!(body.contains("PROVIDER_ERROR"));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_stream_requires_bearer_token() {
        let (app, _) = app(Reply::Text("hi"));
        let response = app
            .oneshot(post("/chat/stream", None, chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ended_chat_rejects_new_messages() {
        let (app, repo) = app(Reply::Text("Hello there"));
        let end_body = serde_json::json!({"chat_id": "c1", "user_id": "user-1"});

        let unknown = app
            .clone()
            .oneshot(post("/chat/end", Some(TOKEN), end_body.clone()))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let first = app
            .clone()
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", "hello")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let ended = app
            .clone()
            .oneshot(post("/chat/end", Some(TOKEN), end_body))
            .await
            .unwrap();
        assert_eq!(ended.status(), StatusCode::OK);
        let body = json_body(ended).await;
        assert_eq!(body["data"]["chat_id"], "c1");
        assert_eq!(body["data"]["status"], "ended");

        let rejected = app
            .oneshot(post("/chat", Some(TOKEN), chat_body("c1", "anyone there?")))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(rejected).await["error"]["code"], "CHAT_ENDED");

        let chat = repo.find_by_id("c1").await.unwrap().unwrap();
        assert!(!chat.is_active());
        assert_eq!(chat.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_end_chat_requires_bearer_token() {
        let (app, _) = app(Reply::Text("hi"));
        let response = app
            .oneshot(post(
                "/chat/end",
                None,
                serde_json::json!({"chat_id": "c1", "user_id": "user-1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
