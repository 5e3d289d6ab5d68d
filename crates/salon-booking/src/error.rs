//! Error taxonomy shared by the stores, the agent tools and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use tracing::error;

/// Why a call to the hosted language model failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalFailure {
    Authentication,
    RateLimited,
    Unavailable,
}

impl ExternalFailure {
    /// Classify a provider HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ExternalFailure::Authentication,
            429 => ExternalFailure::RateLimited,
            _ => ExternalFailure::Unavailable,
        }
    }
}

impl fmt::Display for ExternalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalFailure::Authentication => write!(f, "authentication failed"),
            ExternalFailure::RateLimited => write!(f, "rate limit exceeded"),
            ExternalFailure::Unavailable => write!(f, "model service unavailable"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{kind}: {message}")]
    ExternalService {
        kind: ExternalFailure,
        message: String,
    },

    /// Text extraction failure. Stored on the document row, never returned by an upload.
    #[error("{0}")]
    Processing(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn not_found(message: impl Into<String>) -> Self {
        BookingError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        BookingError::Conflict(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        BookingError::InvalidArgument(message.into())
    }

    pub fn external(kind: ExternalFailure, message: impl Into<String>) -> Self {
        BookingError::ExternalService {
            kind,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            BookingError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            BookingError::Processing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::Database(_)
            | BookingError::Pool(_)
            | BookingError::Io(_)
            | BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::Conflict(_) => "conflict",
            BookingError::InvalidArgument(_) => "invalid",
            _ => "error",
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_classification() {
        assert_eq!(ExternalFailure::from_status(401), ExternalFailure::Authentication);
        assert_eq!(ExternalFailure::from_status(403), ExternalFailure::Authentication);
        assert_eq!(ExternalFailure::from_status(429), ExternalFailure::RateLimited);
        assert_eq!(ExternalFailure::from_status(500), ExternalFailure::Unavailable);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BookingError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(BookingError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(BookingError::invalid("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BookingError::external(ExternalFailure::RateLimited, "slow down").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_messages_are_passed_through() {
        let err = BookingError::conflict("This time slot is no longer available.");
        assert_eq!(err.to_string(), "This time slot is no longer available.");
        assert_eq!(err.outcome_label(), "conflict");
    }
}
