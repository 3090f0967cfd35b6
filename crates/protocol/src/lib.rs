//! Ingress protocol: identities, payloads, rejection types and the
//! transport contract shared by adapters, the session registry and the
//! gateway.
//!
//! Remote adapters (chat-platform connectors) deliver events as JSON
//! objects, either one per HTTP POST or one per WebSocket text frame.

mod transport;

pub use transport::{Transport, TransportError, TransportState};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normal WebSocket closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Server going down.
pub const GOING_AWAY: u16 = 1001;

/// WebSocket close code used for every ingress rejection.
pub const POLICY_VIOLATION: u16 = 1008;

/// A structured event body. Only JSON objects are valid payloads.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stable identity ("self id") of one remote bot account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelfId(String);

impl SelfId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SelfId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SelfId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How an adapter reached the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One request per event; no persistent connection.
    Http,
    /// Long-lived reverse WebSocket connection.
    #[serde(rename = "websocket")]
    WebSocket,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rejections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An adapter refused to authenticate a connection attempt.
///
/// `status` is an HTTP status code; `reason` is forwarded to the peer
/// verbatim (HTTP error body or WebSocket close reason).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("permission denied ({status}): {reason}")]
pub struct PermissionDenied {
    pub status: u16,
    pub reason: String,
}

impl PermissionDenied {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// A body or frame that is not a JSON object.
#[derive(Debug, thiserror::Error)]
pub enum MalformedPayload {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Parse raw bytes into a [`Payload`].
pub fn parse_payload(bytes: &[u8]) -> Result<Payload, MalformedPayload> {
    match serde_json::from_slice::<serde_json::Value>(bytes)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(MalformedPayload::NotAnObject(json_type_name(&other))),
    }
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
