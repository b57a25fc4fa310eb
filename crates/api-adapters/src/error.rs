//! HTTP mapping of service errors. Bodies carry a status word and a
//! caller-safe reason, never internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domains::error::AppError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("failed to render metrics")]
    Metrics,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, word, reason) = match &self {
            ApiError::MalformedRequest(reason) => {
                (StatusCode::BAD_REQUEST, "error", reason.clone())
            }
            ApiError::App(AppError::ValidationError(reason)) => {
                (StatusCode::BAD_REQUEST, "error", reason.clone())
            }
            ApiError::App(AppError::NotFound(kind, _)) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{kind} not found"),
            ),
            ApiError::App(AppError::Unauthorized(_)) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Admin credentials required".to_string(),
            ),
            ApiError::App(AppError::DependencyUnavailable(reason)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", reason.clone())
            }
            ApiError::App(AppError::CryptoFailure(detail)) => {
                error!(%detail, "identity reversal failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "crypto_failure",
                    "Submitter metadata could not be decrypted".to_string(),
                )
            }
            ApiError::App(AppError::Internal(detail)) => {
                error!(%detail, "internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "error",
                    "Internal error".to_string(),
                )
            }
            ApiError::Metrics => {
                error!("metrics encoding failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "error",
                    "Internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "status": word, "reason": reason }))).into_response()
    }
}
