mod adapters;
mod dispatch;
mod observability;
mod server;

pub use adapters::*;
pub use dispatch::*;
pub use observability::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Built-in token adapters (key = adapter name, used as the route prefix).
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.server.host.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.port == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.port".into(),
                message: "port 0 binds an ephemeral port".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: format!(
                    "must be between 0.0 and 1.0, got {}",
                    self.observability.sample_rate
                ),
            });
        }

        if self.dispatch.shutdown_grace_secs == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "dispatch.shutdown_grace_secs".into(),
                message: "in-flight events are abandoned immediately on shutdown".into(),
            });
        }

        for (name, adapter) in &self.adapters {
            let field = format!("adapters.{name}");
            if !is_valid_adapter_name(name) {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.clone(),
                    message: "adapter names may only contain ASCII letters, digits, '-' and '_'"
                        .into(),
                });
            }
            if adapter.self_id_header.trim().is_empty() {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.self_id_header"),
                    message: "header name must not be empty".into(),
                });
            }
            if adapter.access_token_env.is_none() {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("{field}.access_token_env"),
                    message: "no access token configured; any client may connect".into(),
                });
            }
        }

        issues
    }
}

/// Adapter names become the first path segment of every ingress route.
pub fn is_valid_adapter_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
