//! HTTP ingress: one event per `POST /{adapter}/` or `POST /{adapter}/http`.
//!
//! Stateless: the session built here lives only as long as its dispatch
//! unit and is never registered. Responds `204` as soon as the payload is
//! scheduled, so the response never reflects downstream processing.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

use bg_domain::trace::TraceEvent;
use bg_protocol::{parse_payload, TransportKind};

use crate::error::IngressError;
use crate::state::AppState;

/// POST /:adapter/ and /:adapter/http
pub async fn ingest(
    State(state): State<AppState>,
    Path(adapter_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, IngressError> {
    let kind = TransportKind::Http;

    let payload = parse_payload(&body).map_err(|e| {
        tracing::warn!(adapter = %adapter_name, error = %e, "rejected malformed http payload");
        TraceEvent::PayloadRejected {
            adapter: adapter_name.clone(),
            transport: kind.to_string(),
            reason: e.to_string(),
        }
        .emit();
        IngressError::from(e)
    })?;

    let adapter = state.adapters.get(&adapter_name).ok_or_else(|| {
        tracing::warn!(adapter = %adapter_name, "http request for unknown adapter");
        IngressError::UnknownAdapter(adapter_name.clone())
    })?;

    let self_id = adapter
        .check_permission(kind, &headers, Some(&body[..]))
        .await
        .map_err(|denied| {
            TraceEvent::PermissionDenied {
                adapter: adapter_name.clone(),
                transport: kind.to_string(),
                status: denied.status,
                reason: denied.reason.clone(),
            }
            .emit();
            IngressError::from(denied)
        })?;

    // The request is still serviced; the live session keeps its entry.
    if let Some(existing) = state.sessions.get(&self_id) {
        tracing::warn!(
            adapter = %adapter_name,
            self_id = %self_id,
            existing_session_id = %existing.session_id,
            "http event for a bot that is already connected"
        );
        TraceEvent::IdentityConflict {
            adapter: adapter_name.clone(),
            self_id: self_id.to_string(),
            transport: kind.to_string(),
            existing_session_id: existing.session_id.clone(),
            rejected: false,
        }
        .emit();
    }

    let bot = adapter.create_session(kind, self_id, None);
    state.dispatcher.dispatch(bot, payload);

    Ok(StatusCode::NO_CONTENT)
}
