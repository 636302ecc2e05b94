//! Health endpoint configuration

use serde::{Deserialize, Serialize};

/// Configuration for the health/stats HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Enable or disable the health server
    ///
    /// When disabled, the health server will not start.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Address to bind the health server
    ///
    /// Common values:
    /// - `[::]:8080` (IPv6 any address, port 8080)
    /// - `0.0.0.0:8080` (IPv4 any address, port 8080)
    /// - `127.0.0.1:8080` (localhost only, port 8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Maximum queue depth threshold for the readiness probe
    ///
    /// When the number of undelivered messages exceeds this, the readiness
    /// probe fails so traffic is steered away until the backlog drains.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: u64,
}

const fn default_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "[::]:8080".to_string()
}

const fn default_max_queue_depth() -> u64 {
    10000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_listen_address(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}
