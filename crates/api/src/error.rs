use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pulse_core::types::ConnectionId;
use pulse_core::CoreError;
use serde_json::json;

use crate::snapshot::SnapshotError;

/// Failures of hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Credentials were refused by the verifier.
    #[error("Connection rejected: {0}")]
    Rejected(#[source] CoreError),

    #[error("Connection {0} is not open")]
    ConnectionNotFound(ConnectionId),

    #[error("Not allowed to join group '{0}'")]
    Forbidden(String),

    /// The connection's outbound channel is gone.
    #[error("Connection {0} is closed")]
    Closed(ConnectionId),
}

impl HubError {
    /// Machine-readable code, shared by HTTP bodies and socket error frames.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Rejected(_) => "UNAUTHORIZED",
            HubError::ConnectionNotFound(_) => "NOT_FOUND",
            HubError::Forbidden(_) => "FORBIDDEN",
            HubError::Closed(_) => "CONNECTION_CLOSED",
        }
    }
}

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error responses
/// of the form `{"error": "...", "code": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or invalid credentials on an HTTP route.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Hub errors ---
            AppError::Hub(HubError::Rejected(core)) => classify_core_error(core),
            AppError::Hub(err @ HubError::ConnectionNotFound(_)) => {
                (StatusCode::NOT_FOUND, err.code(), err.to_string())
            }
            AppError::Hub(err @ HubError::Forbidden(_)) => {
                (StatusCode::FORBIDDEN, err.code(), err.to_string())
            }
            AppError::Hub(err @ HubError::Closed(_)) => {
                (StatusCode::GONE, err.code(), err.to_string())
            }

            // --- Snapshot source ---
            AppError::Snapshot(err) => {
                tracing::warn!(error = %err, "Snapshot source failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SNAPSHOT_UNAVAILABLE",
                    "Snapshot temporarily unavailable".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::MalformedMessage(msg) => {
            (StatusCode::BAD_REQUEST, "MALFORMED_MESSAGE", msg.clone())
        }
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
    }
}
