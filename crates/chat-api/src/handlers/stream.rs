// ============================================================================
// Chat API - Streaming Chat Handler
// File: crates/chat-api/src/handlers/stream.rs
// ============================================================================

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use validator::Validate;

use chat_core::services::ChatStreamChunk;

use crate::dto::ChatRequest;
use crate::error::ApiError;
use crate::handlers::spawn_deadline;
use crate::state::AppState;

/// POST /chat/stream - forward fragments as SSE `message` events, then one
/// `done` or `error` event
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    request.validate()?;

    let input = request.into_input(state.completion_config.as_ref().clone());
    info!(
        "Chat stream request: user={}, chat={}, message_len={}",
        input.user_id,
        input.chat_id,
        input.user_message.len()
    );

    let cancel = CancellationToken::new();
    spawn_deadline(&cancel, state.request_timeout);

    // Per-request bounded channel; torn down when the producer task ends
    let (tx, mut rx) = mpsc::channel::<ChatStreamChunk>(state.stream_buffer_size);
    let service = state.chat_service.clone();
    let locks = state.locks.clone();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let _lock = locks.acquire(&input.chat_id).await;
        let chat_id = input.chat_id.clone();
        let _ = service.execute_stream(input, tx, &task_cancel).await;
        // Stop the deadline timer
        task_cancel.cancel();
        debug!("Stream task for chat {} finished", chat_id);
    });

    // Dropping the body (client gone) cancels the cycle
    let cancel_on_drop = cancel.drop_guard();
    let stream = async_stream::stream! {
        let _cancel_on_drop = cancel_on_drop;
        while let Some(chunk) = rx.recv().await {
            yield Ok(chunk_event(&chunk));
            if chunk.is_terminal() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn chunk_event(chunk: &ChatStreamChunk) -> Event {
    let event_type = match chunk {
        ChatStreamChunk::Message { .. } => "message",
        ChatStreamChunk::Done { .. } => "done",
        ChatStreamChunk::Error { .. } => "error",
    };
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string()))
}
