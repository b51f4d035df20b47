//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the relay. Pipeline
//! components (log producer/consumer, broadcast bus, session registry)
//! return it as well, so a single enum carries every failure class. Each
//! variant maps to an HTTP status code and structured JSON error response
//! when it surfaces through the REST layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: first name and last name are required",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                 |
/// |-----------|-----------------|-----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request             |
/// | 2000–2999 | Not Found       | 404 Not Found               |
/// | 3000–3999 | Server          | 500 Internal Server Error   |
/// | 5000–5999 | Transport       | 502 / 503 / 504             |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// User with the given ID was not found.
    #[error("user not found: {0}")]
    UserNotFound(i32),

    /// Request or event validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// The durable log could not be reached.
    #[error("log connection failed: {0}")]
    LogConnection(String),

    /// The durable log rejected an append.
    #[error("log send to {topic} failed: {reason}")]
    LogSend {
        /// Destination topic.
        topic: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// The durable log did not acknowledge an append within the deadline.
    #[error("log send to {topic} timed out")]
    LogTimeout {
        /// Destination topic.
        topic: String,
    },

    /// Reading the next message from the durable log failed.
    #[error("log read failed: {0}")]
    LogRead(String),

    /// Committing a consumed offset failed.
    #[error("log commit failed: {0}")]
    LogCommit(String),

    /// Broadcast bus publish or subscribe failure.
    #[error("broadcast error: {0}")]
    Broadcast(String),

    /// Writing to a WebSocket session failed or timed out.
    #[error("session write failed: {0}")]
    SessionWrite(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::UserNotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::SessionWrite(_) => 3002,
            Self::LogConnection(_) => 5001,
            Self::LogSend { .. } => 5002,
            Self::LogTimeout { .. } => 5003,
            Self::LogRead(_) => 5004,
            Self::LogCommit(_) => 5005,
            Self::Broadcast(_) => 5101,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::PersistenceError(_) | Self::SessionWrite(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::LogConnection(_) | Self::Broadcast(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::LogSend { .. } | Self::LogRead(_) | Self::LogCommit(_) => StatusCode::BAD_GATEWAY,
            Self::LogTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
