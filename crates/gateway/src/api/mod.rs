pub mod auth;
pub mod health;
pub mod http;
pub mod sessions;
pub mod ws;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full router.
///
/// Routes are split into **public** (ingress and health, authenticated per
/// adapter where applicable) and **protected** (management API, gated behind
/// the bearer-token middleware).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health::health))
        // Ingress, one set per registered adapter name
        .route("/:adapter/", post(http::ingest))
        .route("/:adapter/http", post(http::ingest))
        .route("/:adapter/ws", get(ws::upgrade))
        .route("/:adapter/ws/", get(ws::upgrade));

    let protected = Router::new()
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:self_id/send", post(sessions::send_to_session))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}
