use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bridge (command broker) settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings governing the command-broker core: submit/await timeouts,
/// the poller's long-poll default, and the periodic purge sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Seconds an ingress handler waits for a business-client result
    /// before reporting a timeout. Read from `TIMEOUT`.
    #[serde(default = "d_timeout")]
    pub command_timeout_secs: f64,
    /// Default long-poll timeout for `/1c/poll` when the caller does not
    /// supply `?timeout=`. `0` means non-blocking. Read from
    /// `POLL_TIMEOUT`. Do not change the default — business clients rely
    /// on the non-blocking default for UI responsiveness.
    #[serde(default = "d_poll_timeout")]
    pub poll_timeout_secs: f64,
    /// How often the purge sweep runs over each channel's pending
    /// commands.
    #[serde(default = "d_purge_interval")]
    pub purge_interval_secs: u64,
    /// Commands pending longer than this are dropped by the purge sweep.
    #[serde(default = "d_purge_max_age")]
    pub purge_max_age_secs: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: d_timeout(),
            poll_timeout_secs: d_poll_timeout(),
            purge_interval_secs: d_purge_interval(),
            purge_max_age_secs: d_purge_max_age(),
        }
    }
}

fn d_timeout() -> f64 {
    180.0
}
fn d_poll_timeout() -> f64 {
    0.0
}
fn d_purge_interval() -> u64 {
    60
}
fn d_purge_max_age() -> f64 {
    600.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Health endpoint detail gating
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// When true, `/health` includes per-channel pending/session
    /// breakdowns. Off by default so channel identifiers do not leak to
    /// unauthenticated probes. Read from `HEALTH_INCLUDE_CHANNEL_DETAILS`.
    #[serde(default)]
    pub include_channel_details: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            include_channel_details: false,
        }
    }
}
