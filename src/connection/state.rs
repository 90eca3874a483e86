use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_connected_at: Option<DateTime<Utc>>,
    /// `now - last connected`, refreshed every tick while disconnected.
    pub downtime_ms: u64,
    #[serde(skip)]
    pub last_connected_anchor: Option<Instant>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn mark_connected(&mut self, at: DateTime<Utc>, now: Instant) {
        self.status = ConnectionStatus::Connected;
        self.last_connected_at = Some(at);
        self.last_connected_anchor = Some(now);
        self.downtime_ms = 0;
    }

    pub fn mark_disconnected(&mut self, now: Instant) {
        self.status = ConnectionStatus::Disconnected;
        self.sync_downtime(now);
    }

    /// Leaves `Connecting` without touching an established connection.
    pub fn abort_connecting(&mut self) {
        if self.status == ConnectionStatus::Connecting {
            self.status = ConnectionStatus::Disconnected;
        }
    }

    /// Never-connected links report zero downtime.
    pub fn sync_downtime(&mut self, now: Instant) {
        if self.is_connected() {
            self.downtime_ms = 0;
            return;
        }
        if let Some(anchor) = self.last_connected_anchor {
            self.downtime_ms = now.saturating_duration_since(anchor).as_millis() as u64;
        }
    }
}
