use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Logging and trace export settings for `botgate serve`.
///
/// With no `otlp_endpoint` only the local log output is produced. When an
/// endpoint is set, every `tracing` span (including the per-connection and
/// per-dispatch spans) is also exported over OTLP/gRPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// `service.name` resource attribute reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Trace sampling ratio in `[0.0, 1.0]`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,

    /// Emit JSON log lines (`true`) or human-readable compact lines.
    #[serde(default = "d_true")]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
            json_logs: true,
        }
    }
}

fn d_service_name() -> String {
    "botgate".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

fn d_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert!(cfg.otlp_endpoint.is_none());
        assert_eq!(cfg.service_name, "botgate");
        assert!((cfg.sample_rate - 1.0).abs() < f64::EPSILON);
        assert!(cfg.json_logs);
    }

    #[test]
    fn parses_exporter_settings() {
        let toml_str = r#"
            otlp_endpoint = "http://otel:4317"
            service_name = "ingress-eu"
            sample_rate = 0.1
            json_logs = false
        "#;
        let cfg: ObservabilityConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.otlp_endpoint.as_deref(), Some("http://otel:4317"));
        assert_eq!(cfg.service_name, "ingress-eu");
        assert!((cfg.sample_rate - 0.1).abs() < f64::EPSILON);
        assert!(!cfg.json_logs);
    }
}
