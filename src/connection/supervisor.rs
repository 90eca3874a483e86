use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    collaborators::DevicePairing,
    config::SupervisorConfig,
    errors::{ErrorKind, ErrorRegistry, Severity},
    events::{EventBus, SupervisorEvent},
    models::{Device, DeviceStatus, PairingPayload},
};

use super::{ConnectionState, ConnectionStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub devices: Vec<Device>,
}

struct LinkState {
    connection: ConnectionState,
    devices: BTreeMap<String, Device>,
}

enum Transition {
    Up,
    Down,
}

/// Sole owner of connectivity state and of every device's status.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    link: Arc<Mutex<LinkState>>,
    registry: ErrorRegistry,
    connectivity: Arc<watch::Sender<bool>>,
    events: EventBus,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Held for a whole device-set transition so watch updates, error
    /// bookkeeping and the ticker follow the order the link state changed in.
    transitions: Arc<Mutex<()>>,
    config: Arc<SupervisorConfig>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: Arc<SupervisorConfig>,
        registry: ErrorRegistry,
        connectivity: watch::Sender<bool>,
        events: EventBus,
    ) -> Self {
        Self {
            link: Arc::new(Mutex::new(LinkState {
                connection: ConnectionState::new(),
                devices: BTreeMap::new(),
            })),
            registry,
            connectivity: Arc::new(connectivity),
            events,
            ticker: Arc::new(Mutex::new(None)),
            transitions: Arc::new(Mutex::new(())),
            config,
        }
    }

    /// Feed the currently reachable devices. Empty means disconnected.
    pub async fn report_device_set(&self, devices: Vec<Device>) -> ConnectionState {
        let _transition = self.transitions.lock().await;
        self.apply_device_set(devices, false).await
    }

    pub async fn pair(
        &self,
        payload: &PairingPayload,
        pairing: &dyn DevicePairing,
    ) -> Result<Device> {
        let placeholder = {
            let mut link = self.link.lock().await;
            if !link.connection.is_connected() {
                link.connection.status = ConnectionStatus::Connecting;
            }
            match link.devices.get_mut(&payload.device_id) {
                Some(known) => {
                    if known.status == DeviceStatus::Offline {
                        known.status = DeviceStatus::Connecting;
                    }
                    false
                }
                None => {
                    let mut pending =
                        Device::new(&payload.device_id, &payload.name, &payload.address);
                    pending.status = DeviceStatus::Connecting;
                    link.devices.insert(pending.id.clone(), pending);
                    true
                }
            }
        };
        info!("pairing with device {} at {}", payload.device_id, payload.address);

        let outcome = match time::timeout(self.config.pairing_timeout(), pairing.pair(payload)).await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "pairing timed out after {}ms",
                self.config.pairing_timeout_ms
            )),
        };

        let device = match outcome {
            Ok(device) => device,
            Err(err) => {
                {
                    let mut link = self.link.lock().await;
                    link.connection.abort_connecting();
                    let pending = link
                        .devices
                        .get(&payload.device_id)
                        .map(|known| known.status == DeviceStatus::Connecting)
                        .unwrap_or(false);
                    if pending && placeholder {
                        link.devices.remove(&payload.device_id);
                    } else if let Some(known) = link.devices.get_mut(&payload.device_id) {
                        if pending {
                            known.status = DeviceStatus::Offline;
                        }
                    }
                }
                self.registry
                    .record(
                        ErrorKind::Connection,
                        Severity::High,
                        format!("Pairing with {} failed: {err}", payload.device_id),
                        false,
                    )
                    .await;
                return Err(err.context(format!("failed to pair with {}", payload.device_id)));
            }
        };

        let mut reachable = self.online_devices().await;
        reachable.retain(|known| known.id != device.id);
        reachable.push(device.clone());
        self.report_device_set(reachable).await;

        let link = self.link.lock().await;
        let paired = link.devices.get(&device.id).cloned().unwrap_or(device);
        Ok(paired)
    }

    /// Explicitly forget a device. Losing the last device this way is not a
    /// fault and raises no error.
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        let _transition = self.transitions.lock().await;
        let remaining = {
            let mut link = self.link.lock().await;
            if link.devices.remove(device_id).is_none() {
                bail!("unknown device {device_id}");
            }
            link.devices
                .values()
                .filter(|device| device.status == DeviceStatus::Online)
                .cloned()
                .collect::<Vec<_>>()
        };

        info!("device {device_id} disconnected by request");
        self.events.emit(SupervisorEvent::DeviceOffline {
            device_id: device_id.to_string(),
        });
        self.apply_device_set(remaining, true).await;
        Ok(())
    }

    pub async fn snapshot(&self) -> ConnectionSnapshot {
        let mut link = self.link.lock().await;
        link.connection.sync_downtime(Instant::now());
        ConnectionSnapshot {
            state: link.connection.clone(),
            devices: link.devices.values().cloned().collect(),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.snapshot().await.state
    }

    pub async fn online_devices(&self) -> Vec<Device> {
        let link = self.link.lock().await;
        link.devices
            .values()
            .filter(|device| device.status == DeviceStatus::Online)
            .cloned()
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub async fn is_device_connected(&self, device_id: &str) -> bool {
        let link = self.link.lock().await;
        link.connection.is_connected()
            && link
                .devices
                .get(device_id)
                .map(|device| device.status == DeviceStatus::Online)
                .unwrap_or(false)
    }

    pub fn subscribe_connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    pub async fn shutdown(&self) {
        self.cancel_ticker().await;
    }

    /// Callers hold `transitions`.
    async fn apply_device_set(&self, devices: Vec<Device>, explicit: bool) -> ConnectionState {
        let now = Utc::now();
        let reported: HashSet<String> = devices.iter().map(|device| device.id.clone()).collect();
        let connected = !reported.is_empty();

        let (transition, went_offline, snapshot) = {
            let mut link = self.link.lock().await;
            let was_connected = link.connection.is_connected();

            let mut went_offline = Vec::new();
            for (id, device) in link.devices.iter_mut() {
                if !reported.contains(id) && device.status == DeviceStatus::Online {
                    device.status = DeviceStatus::Offline;
                    went_offline.push(id.clone());
                }
            }

            for mut device in devices {
                device.status = DeviceStatus::Online;
                device.last_seen = Some(now);
                link.devices.insert(device.id.clone(), device);
            }

            let transition = match (was_connected, connected) {
                (false, true) => {
                    link.connection.mark_connected(now, Instant::now());
                    Some(Transition::Up)
                }
                (true, false) => {
                    link.connection.mark_disconnected(Instant::now());
                    Some(Transition::Down)
                }
                (false, false) => {
                    link.connection.abort_connecting();
                    None
                }
                (true, true) => None,
            };

            (transition, went_offline, link.connection.clone())
        };

        for device_id in went_offline {
            warn!("device {device_id} went offline");
            self.events.emit(SupervisorEvent::DeviceOffline { device_id });
        }

        match transition {
            Some(Transition::Up) => {
                self.cancel_ticker().await;
                self.connectivity.send_replace(true);
                let resolved = self.registry.resolve_kind(ErrorKind::Connection).await;
                info!(
                    "connected ({} device(s)); resolved {resolved} connection error(s)",
                    reported.len()
                );
                self.events.emit(SupervisorEvent::ConnectionChanged {
                    connected: true,
                    state: snapshot.clone(),
                });
            }
            Some(Transition::Down) => {
                self.connectivity.send_replace(false);
                if explicit {
                    info!("disconnected: last device removed");
                } else {
                    self.registry
                        .record(
                            ErrorKind::Connection,
                            Severity::Critical,
                            "Lost connection to all devices",
                            true,
                        )
                        .await;
                }
                self.spawn_ticker().await;
                self.events.emit(SupervisorEvent::ConnectionChanged {
                    connected: false,
                    state: snapshot.clone(),
                });
            }
            None => {}
        }

        snapshot
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let link = self.link.clone();
        let events = self.events.clone();
        let tick_interval = self.config.downtime_tick();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let downtime_ms = {
                    let mut guard = link.lock().await;
                    if guard.connection.is_connected() {
                        break;
                    }
                    guard.connection.sync_downtime(Instant::now());
                    guard.connection.downtime_ms
                };

                events.emit(SupervisorEvent::DowntimeTick { downtime_ms });
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}
