//! Listener configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TCP port of the device's control protocol
pub const DEFAULT_PORT: u16 = 6107;

/// Network listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind, `host:port`
    pub bind: String,
    /// How long to wait for sockets and connection tasks to close
    pub close_timeout_ms: u64,
    /// How long `enable`/`disable` wait for a running transition
    pub transition_timeout_ms: u64,
    /// Open the listener at startup
    pub start_enabled: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_PORT),
            close_timeout_ms: 2000,
            transition_timeout_ms: 5000,
            start_enabled: true,
        }
    }
}

impl ListenerConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }
}
