use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in token adapters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for one `[adapters.<name>]` table.
///
/// Secrets are never stored in the file: the config names the environment
/// variables that hold them and they are read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Header carrying the bot account identity.
    #[serde(default = "d_self_id_header")]
    pub self_id_header: String,
    /// Env var holding the access token expected in `Authorization`.
    #[serde(default)]
    pub access_token_env: Option<String>,
    /// Env var holding the HMAC secret used to sign HTTP bodies
    /// (`X-Signature: sha256=<hex>`).
    #[serde(default)]
    pub secret_env: Option<String>,
    /// Accept HTTP POST ingress for this adapter.
    #[serde(default = "d_true")]
    pub allow_http: bool,
    /// Accept WebSocket ingress for this adapter.
    #[serde(default = "d_true")]
    pub allow_websocket: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            self_id_header: d_self_id_header(),
            access_token_env: None,
            secret_env: None,
            allow_http: true,
            allow_websocket: true,
        }
    }
}

fn d_self_id_header() -> String {
    "x-self-id".into()
}

fn d_true() -> bool {
    true
}
