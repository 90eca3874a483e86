//! Contracts for the systems this crate drives but does not implement:
//! pairing, the device's frame endpoint, shot detection and storage.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::models::{Detection, Device, Frame, PairingPayload, Session, ShotEvent};

#[async_trait]
pub trait DevicePairing: Send + Sync {
    /// Resolve a pairing payload into a device record, or fail.
    async fn pair(&self, payload: &PairingPayload) -> Result<Device>;
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Latest frame the device has. Callers bound this with a timeout.
    async fn latest_frame(&self, device_id: &str) -> Result<Frame>;
}

#[async_trait]
pub trait ShotDetector: Send + Sync {
    /// Opaque inference over a frame; coordinates in target millimetres.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Best-effort durable storage of a finished session.
    async fn save_session(&self, session: &Session, shots: &[ShotEvent]) -> Result<()>;
}

/// Store for deployments without persistence.
pub struct NoopSessionStore;

#[async_trait]
impl SessionStore for NoopSessionStore {
    async fn save_session(&self, session: &Session, shots: &[ShotEvent]) -> Result<()> {
        debug!(
            "not persisting session {} ({} shots): no store configured",
            session.id,
            shots.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionSettings;
    use crate::session::SessionState;

    #[tokio::test]
    async fn noop_store_accepts_everything() {
        let state = SessionState::new("lane-1", SessionSettings::default());
        assert!(NoopSessionStore.save_session(state.session(), &[]).await.is_ok());
    }
}
