//! Gateway error types.
//!
//! `ApiError` is what a REST handler returns; it renders as
//! `{"error": "<message>"}` with the matching HTTP status. Collaborator
//! errors (`StoreError`, `ClassifierError`, `NotifierError`) live with their
//! ports and are mapped here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::ports::outbound::{ClassifierError, NotifierError, StoreError};

/// HTTP-facing error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input
    #[error("{0}")]
    BadRequest(String),

    /// Requested row does not exist
    #[error("{0}")]
    NotFound(String),

    /// Unique field already taken
    #[error("{0}")]
    Conflict(String),

    /// Vision API or mail relay failed
    #[error("{0}")]
    Upstream(String),

    /// Request exceeded its time budget
    #[error("{0}")]
    Timeout(String),

    /// Storage or other internal failure
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a store failure, keeping `not_found` for a missing row and
    /// `context` as the client-facing message for anything else.
    pub fn from_store(err: StoreError, not_found: &str, context: &str) -> Self {
        match err {
            StoreError::UserNotFound(_) => ApiError::NotFound(not_found.to_string()),
            StoreError::Duplicate { field, value } => {
                ApiError::Conflict(format!("{} already registered: {}", field, value))
            }
            other => {
                error!(error = %other, "{}", context);
                ApiError::Internal(context.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        error!(error = %err, "Bottle classification failed");
        match err {
            ClassifierError::Timeout => ApiError::Timeout("Classifier timed out".into()),
            _ => ApiError::Upstream("Classifier Error".into()),
        }
    }
}

impl From<NotifierError> for ApiError {
    fn from(err: NotifierError) -> Self {
        error!(error = %err, "Voucher delivery failed");
        ApiError::Upstream("Error sending email".into())
    }
}

/// Result type for REST operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Gateway-level errors (startup and serving, not per request)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Server stopped with an I/O error
    #[error("server error: {0}")]
    Serve(String),

    /// Storage backend could not be opened
    #[error("storage error: {0}")]
    Storage(String),

    /// Outbound HTTP client could not be built
    #[error("client error: {0}")]
    Client(String),
}
