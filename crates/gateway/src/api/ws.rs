//! WebSocket ingress: `GET /{adapter}/ws` and `GET /{adapter}/ws/`.
//!
//! Admission (adapter lookup, permission check) runs on the handshake
//! request. A refused connection is still upgraded, then immediately closed
//! with code 1008 and the refusal reason; no frame is read from it and
//! nothing is registered for it.
//!
//! Lifecycle of an admitted connection:
//! 1. register the session (refusing duplicates of a live identity)
//! 2. accept the transport and fire `bot_connect` hooks
//! 3. pump frames into the dispatcher until the transport closes
//! 4. unregister (guaranteed by [`RegistrationGuard`] on every exit path)
//!    and fire `bot_disconnect` hooks

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;

use bg_domain::trace::TraceEvent;
use bg_protocol::{SelfId, Transport, TransportKind, NORMAL_CLOSURE};
use bg_sessions::{BotSession, RegisterResult, RegistrationGuard, Session};

use crate::adapter::Adapter;
use crate::dispatch::Dispatcher;
use crate::error::IngressError;
use crate::state::AppState;
use crate::transport::WsTransport;

/// Close reasons are capped at 123 bytes by the WebSocket framing.
const MAX_CLOSE_REASON: usize = 123;

/// GET /:adapter/ws and /:adapter/ws/
///
/// The handshake always completes. A connection refused by admission gets
/// its refusal as close 1008 right after the upgrade, before any frame is
/// read.
pub async fn upgrade(
    State(state): State<AppState>,
    Path(adapter_name): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let admission = admit(&state, &adapter_name, &headers).await;

    ws.on_failed_upgrade({
        let adapter_name = adapter_name.clone();
        move |e| tracing::warn!(adapter = %adapter_name, error = %e, "websocket upgrade failed")
    })
    .on_upgrade(move |socket| async move {
        match admission {
            Ok((adapter, self_id)) => {
                serve_connection(state, adapter, self_id, socket).await;
            }
            Err(err) => {
                let transport = WsTransport::new(socket);
                reject(&transport, &err).await;
            }
        }
    })
}

/// Resolve the adapter and the bot identity from the handshake headers.
async fn admit(
    state: &AppState,
    adapter_name: &str,
    headers: &HeaderMap,
) -> Result<(Arc<dyn Adapter>, SelfId), IngressError> {
    let kind = TransportKind::WebSocket;

    let Some(adapter) = state.adapters.get(adapter_name) else {
        tracing::warn!(adapter = %adapter_name, "websocket connection for unknown adapter");
        return Err(IngressError::UnknownAdapter(adapter_name.to_owned()));
    };

    match adapter.check_permission(kind, headers, None).await {
        Ok(self_id) => Ok((adapter, self_id)),
        Err(denied) => {
            TraceEvent::PermissionDenied {
                adapter: adapter_name.to_owned(),
                transport: kind.to_string(),
                status: denied.status,
                reason: denied.reason.clone(),
            }
            .emit();
            Err(denied.into())
        }
    }
}

async fn serve_connection(
    state: AppState,
    adapter: Arc<dyn Adapter>,
    self_id: SelfId,
    socket: WebSocket,
) {
    let kind = TransportKind::WebSocket;
    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(socket));
    let bot = adapter.create_session(kind, self_id, Some(transport.clone()));
    let session = Arc::new(Session::new(bot.clone(), Some(transport.clone())));

    let mut guard: RegistrationGuard = match state.sessions.register(session.clone()) {
        RegisterResult::Registered(guard) => guard,
        RegisterResult::Conflict(existing) => {
            tracing::warn!(
                adapter = %session.adapter,
                self_id = %session.self_id,
                existing_session_id = %existing.session_id,
                "refusing duplicate websocket connection"
            );
            TraceEvent::IdentityConflict {
                adapter: session.adapter.clone(),
                self_id: session.self_id.to_string(),
                transport: kind.to_string(),
                existing_session_id: existing.session_id.clone(),
                rejected: true,
            }
            .emit();
            let err = IngressError::IdentityConflict {
                self_id: session.self_id.clone(),
                existing_session_id: existing.session_id.clone(),
            };
            reject(transport.as_ref(), &err).await;
            return;
        }
    };

    if let Err(e) = transport.accept().await {
        // Guard drop unregisters.
        tracing::warn!(self_id = %session.self_id, error = %e, "websocket accept failed");
        return;
    }

    tracing::info!(
        adapter = %session.adapter,
        self_id = %session.self_id,
        session_id = %session.session_id,
        "websocket connection accepted"
    );
    state.hooks.fire_bot_connect(&session);

    let frames = pump_frames(transport.as_ref(), &bot, &state.dispatcher).await;

    transport.close(NORMAL_CLOSURE, "").await;
    guard.release();

    tracing::info!(
        adapter = %session.adapter,
        self_id = %session.self_id,
        session_id = %session.session_id,
        frames,
        "websocket connection closed"
    );
    state.hooks.fire_bot_disconnect(&session);
}

/// Read frames until the transport closes, dispatching each payload without
/// waiting for it. Returns the number of payloads dispatched.
pub(crate) async fn pump_frames(
    transport: &dyn Transport,
    bot: &Arc<dyn BotSession>,
    dispatcher: &Dispatcher,
) -> u64 {
    let mut frames = 0;
    while !transport.is_closed() {
        if let Some(payload) = transport.receive().await {
            frames += 1;
            dispatcher.dispatch(bot.clone(), payload);
        }
    }
    frames
}

async fn reject(transport: &dyn Transport, err: &IngressError) {
    let reason = err.to_string();
    tracing::info!(code = err.close_code(), reason = %reason, "closing refused websocket connection");
    transport
        .close(err.close_code(), truncate_reason(&reason))
        .await;
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use bg_protocol::{Payload, TransportError, TransportState};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    /// Replays a script of receive results, then reports closed.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Option<Payload>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::WebSocket
        }
        fn state(&self) -> TransportState {
            if self.script.lock().is_empty() {
                TransportState::Closed
            } else {
                TransportState::Open
            }
        }
        async fn accept(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn receive(&self) -> Option<Payload> {
            self.script.lock().pop_front().flatten()
        }
        async fn send(&self, _payload: &Payload) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close(&self, _code: u16, _reason: &str) {}
    }

    struct RecordingBot {
        self_id: SelfId,
        seen: mpsc::UnboundedSender<Payload>,
    }

    #[async_trait]
    impl BotSession for RecordingBot {
        fn adapter(&self) -> &str {
            "test"
        }
        fn self_id(&self) -> &SelfId {
            &self.self_id
        }
        fn kind(&self) -> TransportKind {
            TransportKind::WebSocket
        }
        async fn handle_message(&self, payload: Payload) {
            let _ = self.seen.send(payload);
        }
    }

    fn payload(n: i64) -> Payload {
        let mut p = Payload::new();
        p.insert("n".into(), serde_json::json!(n));
        p
    }

    #[tokio::test]
    async fn pump_dispatches_every_payload_and_skips_empty_reads() {
        let transport = ScriptedTransport {
            script: Mutex::new(VecDeque::from(vec![
                Some(payload(1)),
                None,
                Some(payload(2)),
                None,
            ])),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bot: Arc<dyn BotSession> = Arc::new(RecordingBot {
            self_id: SelfId::new("B123"),
            seen: tx,
        });
        let dispatcher = Dispatcher::new(None);

        let frames = pump_frames(&transport, &bot, &dispatcher).await;
        assert_eq!(frames, 2);
        assert!(transport.is_closed());

        assert!(dispatcher.shutdown(Duration::from_secs(2)).await);
        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p["n"].as_i64().unwrap());
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn close_reasons_fit_the_frame() {
        assert_eq!(truncate_reason("short"), "short");
        let long = "é".repeat(100);
        let cut = truncate_reason(&long);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert!(long.starts_with(cut));
    }
}
