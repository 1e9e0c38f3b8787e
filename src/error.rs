//! Crate-level error kinds (spec §7), with HTTP mapping for the ones that
//! reach the Intake API boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced synchronously at the Intake API (spec §7).
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("quota exceeded: {remaining} remaining, resets at {reset_at}")]
    QuotaExceeded {
        remaining: u32,
        reset_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("duplicate correlation id")]
    DuplicateCorrelation,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            IntakeError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_input", "message": msg }),
            ),
            IntakeError::QuotaExceeded {
                remaining,
                reset_at,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "quota_exceeded",
                    "remaining": remaining,
                    "reset_at": reset_at.to_rfc3339(),
                }),
            ),
            IntakeError::DuplicateCorrelation => (
                StatusCode::CONFLICT,
                json!({ "error": "duplicate_correlation" }),
            ),
            IntakeError::Store(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "store_unavailable", "message": e.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Errors surfaced by the Data Store (spec §4.C).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate correlation id")]
    DuplicateCorrelation,

    #[error("illegal status transition")]
    IllegalTransition,

    #[error("store operation timed out")]
    Timeout,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("background task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors surfaced by the Broker Client (spec §4.B).
#[derive(Debug, Error, Clone)]
pub enum BrokerError {
    #[error("outbound publish buffer is full")]
    Backpressure,

    #[error("broker is disconnected")]
    Disconnected,

    #[error("broker transport error: {0}")]
    Transport(String),
}

/// Errors recognized by the Response Handler when parsing an inbound agent
/// message (spec §4.G, §7). Never propagated as hard failures — always
/// counted and dropped.
#[derive(Debug, Error)]
pub enum ResponseHandlerError {
    #[error("malformed agent response payload: {0}")]
    Malformed(String),

    #[error("response for unknown or already-terminal analysis")]
    LateOrUnknown,
}
