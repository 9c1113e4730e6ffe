// ============================================================================
// Chat API - Blocking Chat Handler
// File: crates/chat-api/src/handlers/chat.rs
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use validator::Validate;

use chat_core::domain::ChatStatus;

use crate::dto::{ChatRequest, ChatResponse, EndChatRequest, EndChatResponse};
use crate::error::ApiError;
use crate::handlers::spawn_deadline;
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /chat - wait for the whole reply
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ChatResponse>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request.validate()?;

    let input = request.into_input(state.completion_config.as_ref().clone());
    info!(
        "Chat request: user={}, chat={}, message_len={}",
        input.user_id,
        input.chat_id,
        input.user_message.len()
    );

    let cancel = CancellationToken::new();
    // Client disconnect drops this future and with it the guard
    let _cancel_on_drop = cancel.clone().drop_guard();
    spawn_deadline(&cancel, state.request_timeout);

    // The cycle runs on its own task so a dropped connection cannot
    // interrupt persistence halfway
    let service = state.chat_service.clone();
    let locks = state.locks.clone();
    let task_cancel = cancel.clone();
    let output = tokio::spawn(async move {
        let _lock = locks.acquire(&input.chat_id).await;
        service.execute(input, &task_cancel).await
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("completion task failed: {}", e)))??;

    Ok(Json(ApiResponse::success(ChatResponse::from(output))))
}

/// POST /chat/end - close a chat to further messages
pub async fn end_chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<EndChatRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<EndChatResponse>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request.validate()?;
    info!("End chat request: user={}, chat={}", request.user_id, request.chat_id);

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    spawn_deadline(&cancel, state.request_timeout);

    // Waits for any in-flight cycle on the same chat
    let service = state.chat_service.clone();
    let locks = state.locks.clone();
    let task_cancel = cancel.clone();
    let chat_id = request.chat_id.clone();
    tokio::spawn(async move {
        let _lock = locks.acquire(&request.chat_id).await;
        service
            .end_chat(&request.chat_id, &request.user_id, &task_cancel)
            .await
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("end chat task failed: {}", e)))??;

    Ok(Json(ApiResponse::success(EndChatResponse {
        chat_id,
        status: ChatStatus::Ended,
    })))
}
