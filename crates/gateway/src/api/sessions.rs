//! Session management API endpoints.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use bg_protocol::{parse_payload, SelfId};

use crate::error::{api_error, IngressError};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// List connected bot sessions, sorted by identity.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/:self_id/send
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Push a JSON object to a connected bot over its bound transport.
pub async fn send_to_session(
    State(state): State<AppState>,
    Path(self_id): Path<String>,
    body: Bytes,
) -> Response {
    let payload = match parse_payload(&body) {
        Ok(p) => p,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let self_id = SelfId::new(self_id);
    let Some(session) = state.sessions.get(&self_id) else {
        return api_error(StatusCode::NOT_FOUND, format!("bot {self_id} is not connected"));
    };
    let Some(transport) = &session.transport else {
        return api_error(
            StatusCode::CONFLICT,
            format!("bot {self_id} has no bound transport"),
        );
    };

    match transport.send(&payload).await {
        Ok(()) => {
            tracing::debug!(self_id = %self_id, session_id = %session.session_id, "pushed payload to bot");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::warn!(self_id = %self_id, error = %e, "push to bot failed");
            IngressError::from(e).into_response()
        }
    }
}
