use crate::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// A failed request. The client only ever sees `message`; the underlying error is logged.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    /// Answered with `{"message": ...}`.
    #[error("{message}: {source}")]
    Json {
        message: &'static str,
        source: Error,
    },
    /// Answered with `message` as plain text.
    #[error("{message}: {source}")]
    Text {
        message: &'static str,
        source: Error,
    },
    /// A request body that could not be used. Answered with `message` as plain text.
    #[error("{message}: {detail}")]
    BadBody {
        message: &'static str,
        detail: String,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{self}");
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        match self {
            ApiError::Json { message, .. } => {
                (status, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Text { message, .. } | ApiError::BadBody { message, .. } => {
                (status, message).into_response()
            }
        }
    }
}

/// Attaches the client-facing message to a failed command.
pub(crate) trait OrApiError<T> {
    fn or_json(self, message: &'static str) -> Result<T, ApiError>;
    fn or_text(self, message: &'static str) -> Result<T, ApiError>;
}

impl<T> OrApiError<T> for crate::Result<T> {
    fn or_json(self, message: &'static str) -> Result<T, ApiError> {
        self.map_err(|source| ApiError::Json { message, source })
    }

    fn or_text(self, message: &'static str) -> Result<T, ApiError> {
        self.map_err(|source| ApiError::Text { message, source })
    }
}
