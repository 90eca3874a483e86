use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    collaborators::{DevicePairing, FrameSource, SessionStore, ShotDetector},
    config::SupervisorConfig,
    connection::ConnectionSupervisor,
    errors::ErrorRegistry,
    events::{EventBus, SupervisorEvent},
    models::{Device, PairingPayload},
    session::SessionController,
};

/// The outside systems a supervisor drives.
#[derive(Clone)]
pub struct Collaborators {
    pub pairing: Arc<dyn DevicePairing>,
    pub frames: Arc<dyn FrameSource>,
    pub detector: Arc<dyn ShotDetector>,
    pub store: Arc<dyn SessionStore>,
}

/// Top-level handle wiring connectivity, errors and sessions together.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    events: EventBus,
    registry: ErrorRegistry,
    connection: ConnectionSupervisor,
    sessions: SessionController,
    pairing: Arc<dyn DevicePairing>,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Must be called inside a tokio runtime.
    pub fn new(config: SupervisorConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let events = EventBus::new();
        let (connectivity_tx, connectivity_rx) = watch::channel(false);

        let registry = ErrorRegistry::new(config.clone(), connectivity_rx, events.clone());
        let connection = ConnectionSupervisor::new(
            config.clone(),
            registry.clone(),
            connectivity_tx,
            events.clone(),
        );
        let sessions = SessionController::new(
            config.clone(),
            connection.clone(),
            registry.clone(),
            events.clone(),
            collaborators.frames,
            collaborators.detector,
            collaborators.store,
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(watch_devices(
            sessions.clone(),
            events.subscribe(),
            shutdown.clone(),
        ));

        info!(
            "supervisor ready (max_retries={}, buffer_capacity={})",
            config.max_retries, config.buffer_capacity
        );

        Self {
            config,
            events,
            registry,
            connection,
            sessions,
            pairing: collaborators.pairing,
            shutdown,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionSupervisor {
        &self.connection
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub async fn pair_device(&self, payload: &PairingPayload) -> Result<Device> {
        self.connection.pair(payload, self.pairing.as_ref()).await
    }

    /// Stops live sessions, then cancels the watcher, the downtime ticker
    /// and every retry or cleanup timer.
    pub async fn shutdown(&self) {
        info!("supervisor shutting down");
        self.shutdown.cancel();
        let stopped = self.sessions.shutdown().await;
        if !stopped.is_empty() {
            info!("stopped {} live session(s) on shutdown", stopped.len());
        }
        self.connection.shutdown().await;
        self.registry.shutdown().await;
    }
}

async fn watch_devices(
    sessions: SessionController,
    mut events: broadcast::Receiver<SupervisorEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Ok(SupervisorEvent::DeviceOffline { device_id }) => {
                    sessions.handle_device_lost(&device_id).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("device watcher missed {skipped} event(s); reconciling sessions");
                    sessions.reconcile().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("device watcher stopped");
}
