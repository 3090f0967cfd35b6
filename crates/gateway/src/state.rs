use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use bg_domain::config::Config;
use bg_sessions::SessionRegistry;

use crate::adapter::{AdapterRegistry, InboundEvent};
use crate::dispatch::Dispatcher;
use crate::hooks::LifecycleHooks;

/// Capacity of the inbound event bus. Slow subscribers lag and skip events.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Shared application state passed to all handlers.
///
/// Cloning is cheap; every field is reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub adapters: Arc<AdapterRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub hooks: Arc<LifecycleHooks>,
    /// Events published by built-in adapter sessions.
    pub events: broadcast::Sender<InboundEvent>,
    /// SHA-256 of the management API token. `None` = dev mode, no auth.
    pub api_token_hash: Option<Vec<u8>>,
    pub started_at: Instant,
}

impl AppState {
    /// Empty state: no adapters, no sessions, management API open.
    pub fn new(config: Arc<Config>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let dispatcher = Dispatcher::new(config.dispatch.concurrency_limit());
        Self {
            adapters: Arc::new(AdapterRegistry::new()),
            sessions: Arc::new(SessionRegistry::new()),
            dispatcher: Arc::new(dispatcher),
            hooks: Arc::new(LifecycleHooks::new()),
            events,
            api_token_hash: None,
            started_at: Instant::now(),
            config,
        }
    }
}
