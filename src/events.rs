use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    analytics::SessionMetrics,
    connection::ConnectionState,
    errors::ErrorRecord,
    models::{Session, ShotEvent},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SupervisorEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionChanged { connected: bool, state: ConnectionState },
    #[serde(rename_all = "camelCase")]
    DowntimeTick { downtime_ms: u64 },
    #[serde(rename_all = "camelCase")]
    DeviceOffline { device_id: String },
    ErrorRaised { record: ErrorRecord },
    ErrorRetried { record: ErrorRecord },
    ErrorResolved { id: String },
    SessionChanged { session: Session },
    ShotDetected { shot: ShotEvent },
    SessionCompleted {
        session: Session,
        metrics: Option<SessionMetrics>,
    },
}

/// Fan-out of supervisor events. Subscribers unsubscribe by dropping their
/// receiver; publishing with nobody listening is fine.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SupervisorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SupervisorEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
