use serde::Serialize;

/// Structured trace events emitted across all botgate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionRegistered {
        adapter: String,
        self_id: String,
        session_id: String,
        transport: String,
    },
    SessionUnregistered {
        adapter: String,
        self_id: String,
        session_id: String,
        connected_secs: i64,
    },
    IdentityConflict {
        adapter: String,
        self_id: String,
        transport: String,
        existing_session_id: String,
        rejected: bool,
    },
    PermissionDenied {
        adapter: String,
        transport: String,
        status: u16,
        reason: String,
    },
    PayloadRejected {
        adapter: String,
        transport: String,
        reason: String,
    },
    EventReceived {
        adapter: String,
        self_id: String,
        transport: String,
        keys: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "bg_event");
    }
}
