//! AppState construction from a loaded [`Config`].
//!
//! Shared by `botgate serve` and anything embedding the gateway through
//! [`crate::Driver`].

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast::error::RecvError;

use bg_domain::config::{Config, ConfigSeverity};

use crate::adapter::TokenAdapter;
use crate::state::AppState;

/// Validate config, register the configured adapters and return a
/// fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    let mut state = AppState::new(config.clone());

    // ── Adapters ─────────────────────────────────────────────────────
    for (name, adapter_cfg) in &config.adapters {
        let adapter = TokenAdapter::from_config(name, adapter_cfg, state.events.clone())
            .with_context(|| format!("configuring adapter '{name}'"))?;
        state.adapters.register(Arc::new(adapter));
    }
    if state.adapters.is_empty() {
        tracing::warn!("no adapters configured, every ingress request will be refused");
    } else {
        tracing::info!(adapters = ?state.adapters.names(), "adapter registry ready");
    }

    // ── API token (read once, hash for constant-time comparison) ─────
    state.api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                tracing::info!(source = %format!("env:{env_var}"), "management API token auth enabled");
                Some(Sha256::digest(token.trim().as_bytes()).to_vec())
            }
            None => {
                tracing::warn!(
                    "management API auth DISABLED (dev mode), set the {env_var} env var to protect /v1"
                );
                None
            }
        }
    };

    tracing::info!(
        max_in_flight = config.dispatch.max_in_flight,
        shutdown_grace_secs = config.dispatch.shutdown_grace_secs,
        "dispatch core ready"
    );

    Ok(state)
}

/// Log every event published on the bus. Stands in for a host pipeline
/// when the gateway runs standalone.
pub fn spawn_event_logger(state: &AppState) -> tokio::task::JoinHandle<()> {
    let mut rx = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(
                    adapter = %event.adapter,
                    self_id = %event.self_id,
                    transport = %event.transport,
                    keys = event.payload.len(),
                    "inbound event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged, events skipped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
