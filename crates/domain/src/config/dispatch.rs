use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Limits for fire-and-forget event dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of message handlers running at once across all
    /// sessions. `0` means unbounded. Excess units wait inside their own
    /// task, never in the connection read loop.
    #[serde(default)]
    pub max_in_flight: usize,
    /// How long shutdown waits for running handlers before abandoning them.
    #[serde(default = "d_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 0,
            shutdown_grace_secs: d_grace(),
        }
    }
}

impl DispatchConfig {
    /// `None` when dispatch is unbounded.
    pub fn concurrency_limit(&self) -> Option<usize> {
        (self.max_in_flight > 0).then_some(self.max_in_flight)
    }
}

fn d_grace() -> u64 {
    10
}
