//! Relay configuration.
//!
//! The relay carries almost no operator-facing configuration surface — it
//! has no data directory, no identity, nothing to persist — so this is a
//! single flat struct rather than the sectioned config a stateful daemon
//! would need. Values come from the environment, with the same
//! env-override-then-default pattern as the rest of the workspace.

use serde::{Deserialize, Serialize};

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the HTTP+WS listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// How often the TTL sweep runs over sessions and queues (§5).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl RelayConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("DOOMCODE_RELAY_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(secs) = std::env::var("DOOMCODE_RELAY_SWEEP_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse() {
                config.sweep_interval_secs = parsed;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8787");
        assert_eq!(config.sweep_interval_secs, 60);
    }
}
