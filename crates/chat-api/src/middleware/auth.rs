//! Bearer-token check for the chat routes

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == &*state.auth_token => Ok(next.run(request).await),
        Some(_) => {
            warn!("Rejected request with invalid bearer token");
            Err(ApiError::Unauthorized("invalid bearer token".to_string()))
        }
        None => Err(ApiError::Unauthorized("missing bearer token".to_string())),
    }
}
