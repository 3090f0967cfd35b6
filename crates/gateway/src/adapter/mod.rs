//! Adapters: named chat-platform connector types.
//!
//! An adapter authenticates inbound connections ([`Adapter::check_permission`])
//! and builds the [`BotSession`] that receives the connection's events.
//! Adapters are registered by name at startup; the name is the first path
//! segment of every ingress route (`/{adapter}/http`, `/{adapter}/ws`).

pub mod token;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use parking_lot::RwLock;

use bg_protocol::{PermissionDenied, SelfId, Transport, TransportKind};
use bg_sessions::BotSession;

pub use token::{InboundEvent, RelayBot, TokenAdapter};

#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Registry key and route prefix.
    fn name(&self) -> &str;

    /// Authenticate a connection attempt and return the bot identity.
    ///
    /// `body` is the raw request body for HTTP and `None` for WebSocket
    /// (checked before the upgrade completes). Must not mutate shared state.
    async fn check_permission(
        &self,
        kind: TransportKind,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<SelfId, PermissionDenied>;

    /// Build the session object for an authenticated connection.
    /// `transport` is `Some` for WebSocket connections.
    fn create_session(
        &self,
        kind: TransportKind,
        self_id: SelfId,
        transport: Option<Arc<dyn Transport>>,
    ) -> Arc<dyn BotSession>;
}

/// Name → adapter table. Populated at startup, read on every request.
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn Adapter>>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Register an adapter under its own name. Returns the adapter it
    /// replaced, if any.
    pub fn register(&self, adapter: Arc<dyn Adapter>) -> Option<Arc<dyn Adapter>> {
        let name = adapter.name().to_owned();
        let previous = self.adapters.write().insert(name.clone(), adapter);
        if previous.is_some() {
            tracing::warn!(adapter = %name, "adapter re-registered, previous one replaced");
        } else {
            tracing::info!(adapter = %name, "adapter registered");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[test]
    fn register_and_lookup() {
        let (tx, _rx) = broadcast::channel(4);
        let reg = AdapterRegistry::new();
        assert!(reg.is_empty());

        assert!(reg.register(Arc::new(TokenAdapter::new("onebot", tx.clone()))).is_none());
        assert!(reg.register(Arc::new(TokenAdapter::new("feishu", tx.clone()))).is_none());

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("onebot").unwrap().name(), "onebot");
        assert!(reg.get("qq").is_none());
        assert_eq!(reg.names(), vec!["feishu".to_string(), "onebot".to_string()]);
    }

    #[test]
    fn reregistration_replaces() {
        let (tx, _rx) = broadcast::channel(4);
        let reg = AdapterRegistry::new();
        reg.register(Arc::new(TokenAdapter::new("onebot", tx.clone())));
        let previous = reg.register(Arc::new(TokenAdapter::new("onebot", tx)));
        assert!(previous.is_some());
        assert_eq!(reg.len(), 1);
    }
}
