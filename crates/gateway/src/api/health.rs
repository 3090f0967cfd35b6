use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "sessions": state.sessions.len(),
        "adapters": state.adapters.names(),
        "dispatch": {
            "in_flight": state.dispatcher.in_flight(),
            "dispatched": state.dispatcher.dispatched(),
        },
    }))
}
