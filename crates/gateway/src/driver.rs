//! Embedding facade: register adapters and hooks, then serve.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use bg_gateway::Driver;
//! use bg_domain::config::Config;
//!
//! let driver = Driver::new(Config::default());
//! driver.on_startup(|| Box::pin(async { Ok(()) }));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! driver.serve(listener, std::future::pending()).await
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use bg_domain::config::{Config, CorsConfig};
use bg_protocol::GOING_AWAY;
use bg_sessions::Session;

use crate::adapter::Adapter;
use crate::api;
use crate::state::AppState;

pub struct Driver {
    state: AppState,
}

impl Driver {
    /// A driver with no adapters registered and the management API open.
    pub fn new(config: Config) -> Self {
        Self::from_state(AppState::new(Arc::new(config)))
    }

    /// A driver with every `[adapters]` entry of `config` registered.
    pub fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        crate::bootstrap::build_app_state(config).map(Self::from_state)
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn register_adapter(&self, adapter: impl Adapter) -> &Self {
        self.state.adapters.register(Arc::new(adapter));
        self
    }

    pub fn on_startup<F>(&self, hook: F) -> &Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.state.hooks.on_startup(hook);
        self
    }

    pub fn on_shutdown<F>(&self, hook: F) -> &Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.state.hooks.on_shutdown(hook);
        self
    }

    pub fn on_bot_connect<F>(&self, hook: F) -> &Self
    where
        F: Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.state.hooks.on_bot_connect(hook);
        self
    }

    pub fn on_bot_disconnect<F>(&self, hook: F) -> &Self
    where
        F: Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.state.hooks.on_bot_disconnect(hook);
        self
    }

    /// The complete HTTP application: routes plus tracing, CORS and the
    /// concurrency limit from `[server]`.
    pub fn router(&self) -> Router {
        let server = &self.state.config.server;
        let max_concurrent = server.max_concurrent_requests.max(1);

        api::router(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(build_cors_layer(&server.cors))
            .layer(ConcurrencyLimitLayer::new(max_concurrent))
            .with_state(self.state.clone())
    }

    /// Run startup hooks, serve until `shutdown` resolves, then close live
    /// WebSocket sessions, drain dispatch and run shutdown hooks.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let failed = self.state.hooks.run_startup().await;
        if failed > 0 {
            tracing::warn!(failed, "some startup hooks failed");
        }

        let addr = listener.local_addr().context("reading listener address")?;
        tracing::info!(
            addr = %addr,
            adapters = ?self.state.adapters.names(),
            "botgate listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("axum server error")?;

        tracing::info!("server stopped, closing live sessions");
        self.close_sessions().await;

        let grace = Duration::from_secs(self.state.config.dispatch.shutdown_grace_secs);
        self.state.dispatcher.shutdown(grace).await;

        self.state.hooks.run_shutdown().await;
        tracing::info!("shutdown complete");
        Ok(())
    }

    /// Upgraded connections outlive the HTTP server; ask each peer to leave.
    async fn close_sessions(&self) {
        for session in self.state.sessions.sessions() {
            if let Some(transport) = &session.transport {
                transport.close(GOING_AWAY, "server shutting down").await;
            }
        }
    }
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). A literal `"*"` allows all origins.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    // allow_credentials is incompatible with wildcard origins.
    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\", all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin_str = origin.to_str().unwrap_or("");
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}
