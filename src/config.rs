use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsConfig;

/// Sliding-window policy for escalating repeated poll misses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissEscalation {
    /// Number of most recent polls considered.
    pub window: usize,
    /// Failures within the window that raise a `device`/`high` error.
    pub max_misses: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
    pub max_retries: u32,
    /// How long a resolved error stays visible before it is dropped.
    pub resolved_grace_ms: u64,
    /// Low/medium errors without auto-retry resolve themselves after this.
    pub auto_clear_ms: u64,
    /// Window `retry_all_connections` waits for a device to come back.
    pub reconnect_wait_ms: u64,
    pub downtime_tick_ms: u64,
    pub buffer_capacity: usize,
    pub poll_timeout_ms: u64,
    pub poll_error_backoff_ms: u64,
    pub pairing_timeout_ms: u64,
    pub miss_escalation: Option<MissEscalation>,
    pub analytics: AnalyticsConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: 1000,
            retry_multiplier: 2.0,
            max_retries: 5,
            resolved_grace_ms: 5000,
            auto_clear_ms: 10_000,
            reconnect_wait_ms: 3000,
            downtime_tick_ms: 1000,
            buffer_capacity: 100,
            poll_timeout_ms: 10_000,
            poll_error_backoff_ms: 250,
            pairing_timeout_ms: 8000,
            miss_escalation: None,
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl SupervisorConfig {
    /// Parse a (possibly partial) JSON object over the defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid supervisor configuration")
    }

    /// `base * multiplier^retry_count`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = self.retry_multiplier.max(1.0).powi(retry_count as i32);
        let millis = (self.retry_base_delay_ms as f64 * factor).min(u64::MAX as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn resolved_grace(&self) -> Duration {
        Duration::from_millis(self.resolved_grace_ms)
    }

    pub fn auto_clear(&self) -> Duration {
        Duration::from_millis(self.auto_clear_ms)
    }

    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect_wait_ms)
    }

    pub fn downtime_tick(&self) -> Duration {
        Duration::from_millis(self.downtime_tick_ms.max(1))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_error_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_error_backoff_ms)
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_millis(self.pairing_timeout_ms)
    }
}
