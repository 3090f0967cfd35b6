use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use bg_protocol::{Payload, SelfId, Transport, TransportKind};

/// The message-handling half of an adapter: receives every payload the
/// gateway dispatches for one bot connection.
#[async_trait]
pub trait BotSession: Send + Sync {
    /// Name of the adapter that created this session.
    fn adapter(&self) -> &str;

    fn self_id(&self) -> &SelfId;

    fn kind(&self) -> TransportKind;

    /// Process one inbound event. Failures are the implementation's to
    /// report; the gateway never observes the outcome.
    async fn handle_message(&self, payload: Payload);
}

/// One logical bot connection as tracked by the gateway.
pub struct Session {
    pub session_id: String,
    pub adapter: String,
    pub self_id: SelfId,
    pub kind: TransportKind,
    pub connected_at: DateTime<Utc>,
    /// Bound transport. `None` for stateless HTTP sessions.
    pub transport: Option<Arc<dyn Transport>>,
    pub bot: Arc<dyn BotSession>,
}

impl Session {
    pub fn new(bot: Arc<dyn BotSession>, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            adapter: bot.adapter().to_owned(),
            self_id: bot.self_id().clone(),
            kind: bot.kind(),
            connected_at: Utc::now(),
            transport,
            bot,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            adapter: self.adapter.clone(),
            self_id: self.self_id.clone(),
            transport: self.kind,
            connected_at: self.connected_at,
            open: self.transport.as_ref().is_some_and(|t| !t.is_closed()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("adapter", &self.adapter)
            .field("self_id", &self.self_id)
            .field("kind", &self.kind)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Summary returned by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub adapter: String,
    pub self_id: SelfId,
    pub transport: TransportKind,
    pub connected_at: DateTime<Utc>,
    pub open: bool,
}
