use axum::http::StatusCode;
use axum::response::{IntoResponse, Response, Json};
use serde_json::json;
use thiserror::Error;

use ptrack_gateway::{GatewayError, RejectionKind};
use ptrack_types::TypeError;
use ptrack_worker::IntakeError;

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by request handlers, rendered as `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// This process has no ledger connection to answer from.
    #[error("ledger view not available")]
    LedgerUnavailable,

    /// The ledger could not be reached or answered nonsense.
    #[error("ledger error: {0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Duplicate(id) => Self::Conflict(format!("Product {id} already exists")),
            IntakeError::NotFound(_) => Self::NotFound("Product not found".into()),
            err @ IntakeError::NotRetryable { .. } => Self::Conflict(err.to_string()),
            IntakeError::Publish { .. } => Self::Internal("Failed to queue message".into()),
            IntakeError::Store(e) => Self::Internal(format!("Failed to save to DB: {e}")),
            IntakeError::Encoding(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<TypeError> for ApiError {
    fn from(err: TypeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected {
                kind: RejectionKind::NotFound,
                ..
            } => Self::NotFound("Product not found on ledger".into()),
            other => Self::BadGateway(other.to_string()),
        }
    }
}
