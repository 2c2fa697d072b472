//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single ledger transfer. Elapsed means failed.
    pub transfer_timeout_ms: Option<u64>,
    /// Buffer size of the broadcast event channel
    pub event_channel_capacity: usize,
    /// Name of the escrow custody account
    pub escrow_account: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transfer_timeout_ms: None,
            event_channel_capacity: 1024,
            escrow_account: "escrow".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transfer_timeout_ms: std::env::var("ESCROW_TRANSFER_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok()),
            event_channel_capacity: std::env::var("ESCROW_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_channel_capacity),
            escrow_account: std::env::var("ESCROW_ACCOUNT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.escrow_account),
        }
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_ms.map(Duration::from_millis)
    }
}
