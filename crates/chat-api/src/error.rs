//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use chat_core::error::DomainError;

use crate::response::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Domain(DomainError::from(errors))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Domain(e) => match e {
                DomainError::Validation(_) | DomainError::ChatEnded(_) => StatusCode::BAD_REQUEST,
                DomainError::ContextBudgetExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                DomainError::ChatNotFound(_) => StatusCode::NOT_FOUND,
                DomainError::ChatAlreadyExists(_) => StatusCode::CONFLICT,
                DomainError::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
                DomainError::Cancelled => StatusCode::REQUEST_TIMEOUT,
                DomainError::Tokenization { .. } | DomainError::Persistence(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Domain(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{} ({}): {}", self.code(), status, self);
        } else {
            tracing::warn!("{} ({}): {}", self.code(), status, self);
        }

        let body = Json(ApiResponse::<()>::error(self.code(), &self.to_string()));
        (status, body).into_response()
    }
}
