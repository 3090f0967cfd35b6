//! Built-in adapter configured from `[adapters.<name>]`.
//!
//! Follows the reverse-connection convention of common bot bridges:
//! - identity in `X-Self-ID` (header name configurable)
//! - optional access token in `Authorization: Bearer <token>` or
//!   `Authorization: Token <token>`
//! - optional HMAC-SHA256 body signature in `X-Signature: sha256=<hex>`
//!   (HTTP only, since WebSocket is authenticated before any body exists)
//!
//! Sessions created by this adapter publish every event on the gateway's
//! broadcast bus as an [`InboundEvent`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::broadcast;

use bg_domain::config::AdapterConfig;
use bg_domain::trace::TraceEvent;
use bg_protocol::{Payload, PermissionDenied, SelfId, Transport, TransportKind};
use bg_sessions::BotSession;

use super::Adapter;

type HmacSha256 = Hmac<Sha256>;

/// One event handed to the host pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct InboundEvent {
    pub adapter: String,
    pub self_id: SelfId,
    pub transport: TransportKind,
    pub received_at: DateTime<Utc>,
    pub payload: Payload,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TokenAdapter {
    name: String,
    self_id_header: HeaderName,
    /// SHA-256 of the expected access token. `None` = open.
    token_hash: Option<Vec<u8>>,
    /// HMAC key for body signatures. `None` = unsigned bodies accepted.
    secret: Option<Vec<u8>>,
    allow_http: bool,
    allow_websocket: bool,
    events: broadcast::Sender<InboundEvent>,
}

impl TokenAdapter {
    /// An open adapter: identity header required, no token, no signature.
    pub fn new(name: impl Into<String>, events: broadcast::Sender<InboundEvent>) -> Self {
        Self {
            name: name.into(),
            self_id_header: HeaderName::from_static("x-self-id"),
            token_hash: None,
            secret: None,
            allow_http: true,
            allow_websocket: true,
            events,
        }
    }

    pub fn with_access_token(mut self, token: &str) -> Self {
        self.token_hash = Some(Sha256::digest(token.as_bytes()).to_vec());
        self
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.as_bytes().to_vec());
        self
    }

    /// Build from config, reading the named secret env vars once.
    pub fn from_config(
        name: &str,
        cfg: &AdapterConfig,
        events: broadcast::Sender<InboundEvent>,
    ) -> bg_domain::Result<Self> {
        let adapter_err = |message: String| bg_domain::Error::Adapter {
            adapter: name.to_owned(),
            message,
        };

        let self_id_header = HeaderName::from_bytes(cfg.self_id_header.trim().as_bytes())
            .map_err(|e| adapter_err(format!("invalid self_id_header: {e}")))?;

        let mut adapter = Self::new(name, events);
        adapter.self_id_header = self_id_header;
        adapter.allow_http = cfg.allow_http;
        adapter.allow_websocket = cfg.allow_websocket;

        if let Some(var) = &cfg.access_token_env {
            let token = read_secret_env(var).map_err(adapter_err)?;
            adapter = adapter.with_access_token(&token);
        }
        if let Some(var) = &cfg.secret_env {
            let secret = read_secret_env(var).map_err(adapter_err)?;
            adapter = adapter.with_secret(&secret);
        }

        tracing::info!(
            adapter = %name,
            token = adapter.token_hash.is_some(),
            signed_bodies = adapter.secret.is_some(),
            http = adapter.allow_http,
            websocket = adapter.allow_websocket,
            "token adapter configured"
        );

        Ok(adapter)
    }

    fn check_token(&self, headers: &HeaderMap) -> Result<(), PermissionDenied> {
        let Some(expected) = &self.token_hash else {
            return Ok(());
        };
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("Token ")))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let Some(provided) = provided else {
            return Err(PermissionDenied::new(401, "access token is missing"));
        };

        // Hashing normalizes lengths so ct_eq always compares 32 bytes.
        let provided_hash = Sha256::digest(provided.as_bytes());
        if !bool::from(provided_hash.ct_eq(expected.as_slice())) {
            return Err(PermissionDenied::new(403, "access token is invalid"));
        }
        Ok(())
    }

    fn check_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), PermissionDenied> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        let Some(sig_header) = headers.get("x-signature").and_then(|v| v.to_str().ok()) else {
            return Err(PermissionDenied::new(401, "missing signature header"));
        };
        let sig_hex = sig_header.strip_prefix("sha256=").unwrap_or(sig_header);

        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| PermissionDenied::new(500, "signing key rejected"))?;
        mac.update(body);
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed.as_bytes().ct_eq(sig_hex.as_bytes()).unwrap_u8() != 1 {
            return Err(PermissionDenied::new(403, "signature is invalid"));
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for TokenAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_permission(
        &self,
        kind: TransportKind,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<SelfId, PermissionDenied> {
        let enabled = match kind {
            TransportKind::Http => self.allow_http,
            TransportKind::WebSocket => self.allow_websocket,
        };
        if !enabled {
            return Err(PermissionDenied::new(
                405,
                format!("{kind} ingress is disabled for this adapter"),
            ));
        }

        let self_id = headers
            .get(&self.self_id_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PermissionDenied::new(400, format!("missing {} header", self.self_id_header))
            })?;

        if let Some(body) = body {
            self.check_signature(headers, body)?;
        }
        self.check_token(headers)?;

        Ok(SelfId::new(self_id))
    }

    fn create_session(
        &self,
        kind: TransportKind,
        self_id: SelfId,
        _transport: Option<Arc<dyn Transport>>,
    ) -> Arc<dyn BotSession> {
        Arc::new(RelayBot {
            adapter: self.name.clone(),
            self_id,
            kind,
            events: self.events.clone(),
        })
    }
}

fn read_secret_env(var: &str) -> Result<String, String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        Ok(_) => Err(format!("env var {var} is empty")),
        Err(_) => Err(format!("env var {var} is not set")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session of a [`TokenAdapter`]: republishes events on the broadcast bus.
pub struct RelayBot {
    adapter: String,
    self_id: SelfId,
    kind: TransportKind,
    events: broadcast::Sender<InboundEvent>,
}

#[async_trait]
impl BotSession for RelayBot {
    fn adapter(&self) -> &str {
        &self.adapter
    }

    fn self_id(&self) -> &SelfId {
        &self.self_id
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn handle_message(&self, payload: Payload) {
        TraceEvent::EventReceived {
            adapter: self.adapter.clone(),
            self_id: self.self_id.to_string(),
            transport: self.kind.to_string(),
            keys: payload.len(),
        }
        .emit();

        let event = InboundEvent {
            adapter: self.adapter.clone(),
            self_id: self.self_id.clone(),
            transport: self.kind,
            received_at: Utc::now(),
            payload,
        };
        if self.events.send(event).is_err() {
            tracing::debug!(
                adapter = %self.adapter,
                self_id = %self.self_id,
                "no event subscribers, event dropped"
            );
        }
    }
}
