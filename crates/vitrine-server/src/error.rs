use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use vitrine_core::ErrorCode;
use vitrine_search::SearchError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("Malformed upload: {message}")]
    Upload { status: StatusCode, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

/// API error body: `{"error": {"code", "message", "hint"}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Search(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Search(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload { status, .. } => *status,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }

    const fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Search(err) => Some(err.code()),
            Self::Internal(_) => Some(ErrorCode::InternalUnexpected),
            Self::Upload { .. } | Self::NotFound => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }

        let code = self.error_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.map_or_else(
                    || status.as_str().to_string(),
                    |code| code.code().to_string(),
                ),
                message: self.to_string(),
                hint: code.and_then(ErrorCode::hint).map(str::to_string),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}
