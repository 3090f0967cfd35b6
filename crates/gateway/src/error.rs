//! Ingress failure taxonomy and its mapping onto HTTP responses and
//! WebSocket close frames.
//!
//! Every variant is scoped to a single connection attempt; none of them is
//! fatal to the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use bg_protocol::{MalformedPayload, PermissionDenied, SelfId, TransportError, POLICY_VIOLATION};

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// Body or frame is not a JSON object.
    #[error("invalid payload: {0}")]
    MalformedPayload(#[from] MalformedPayload),

    /// No adapter is registered under the requested name.
    #[error("adapter not found")]
    UnknownAdapter(String),

    /// The adapter refused the credentials.
    #[error("{}", .0.reason)]
    PermissionDenied(#[from] PermissionDenied),

    /// The identity already has a live session. Only WebSocket ingress
    /// refuses on this; HTTP ingress logs the conflict and proceeds.
    #[error("bot {self_id} is already connected")]
    IdentityConflict {
        self_id: SelfId,
        existing_session_id: String,
    },

    /// Pushing to a connected bot failed on its transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl IngressError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::UnknownAdapter(_) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(denied) => {
                StatusCode::from_u16(denied.status).unwrap_or(StatusCode::FORBIDDEN)
            }
            Self::IdentityConflict { .. } => StatusCode::CONFLICT,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// WebSocket close code for rejecting a connection with this error.
    pub fn close_code(&self) -> u16 {
        POLICY_VIOLATION
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        api_error(self.status(), self.to_string())
    }
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
