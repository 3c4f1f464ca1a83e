use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::session::RelayError;
use crate::core::upstream::UpstreamError;

/// Errors returned from HTTP handlers.
///
/// Rendered as `{"status": "error", "message": ...}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Relay(#[from] RelayError),

    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Relay(RelayError::ConnectionFailure { .. })
            | AppError::Relay(RelayError::FatalStream(_))
            | AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Relay(RelayError::NotRunning)
            | AppError::Relay(RelayError::InvalidState(_)) => StatusCode::CONFLICT,
            AppError::Relay(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
