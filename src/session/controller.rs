use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    analytics::{self, SessionMetrics},
    collaborators::{FrameSource, SessionStore, ShotDetector},
    config::SupervisorConfig,
    connection::ConnectionSupervisor,
    errors::{ErrorKind, ErrorRegistry, Severity},
    events::{EventBus, SupervisorEvent},
    models::{Session, SessionSettings, SessionStatus, ShotEvent, StopReason},
    polling::{PollContext, PollingController, ShotAggregator},
};

use super::SessionState;

/// What a finished session leaves behind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session: Session,
    pub shots: Vec<ShotEvent>,
    pub metrics: Option<SessionMetrics>,
    pub active_ms: u64,
}

struct SessionSlot {
    state: SessionState,
    aggregator: ShotAggregator,
    polling: PollingController,
}

#[derive(Clone)]
pub struct SessionController {
    /// Live sessions keyed by device id. One entry per device at most.
    slots: Arc<Mutex<HashMap<String, SessionSlot>>>,
    connection: ConnectionSupervisor,
    registry: ErrorRegistry,
    events: EventBus,
    config: Arc<SupervisorConfig>,
    frames: Arc<dyn FrameSource>,
    detector: Arc<dyn ShotDetector>,
    store: Arc<dyn SessionStore>,
}

impl SessionController {
    pub fn new(
        config: Arc<SupervisorConfig>,
        connection: ConnectionSupervisor,
        registry: ErrorRegistry,
        events: EventBus,
        frames: Arc<dyn FrameSource>,
        detector: Arc<dyn ShotDetector>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            connection,
            registry,
            events,
            config,
            frames,
            detector,
            store,
        }
    }

    pub async fn start(&self, device_id: &str, settings: SessionSettings) -> Result<Session> {
        if !self.connection.is_device_connected(device_id).await {
            return Err(self
                .reject(format!("Cannot start a session: device {device_id} is not connected"))
                .await);
        }

        let session = {
            let mut slots = self.slots.lock().await;
            if let Some(existing) = slots.get(device_id) {
                let existing_id = existing.state.id().to_string();
                drop(slots);
                return Err(self
                    .reject(format!(
                        "Cannot start a session: device {device_id} already runs session {existing_id}"
                    ))
                    .await);
            }

            let mut state = SessionState::new(device_id, settings);
            state.begin(Instant::now())?;

            let aggregator = ShotAggregator::open(state.id(), self.config.buffer_capacity);
            let mut polling = PollingController::new();
            polling.start(self.poll_context(&state, &aggregator))?;

            let session = state.session().clone();
            slots.insert(
                device_id.to_string(),
                SessionSlot {
                    state,
                    aggregator,
                    polling,
                },
            );
            session
        };

        info!("session {} started on device {device_id}", session.id);
        self.events.emit(SupervisorEvent::SessionChanged {
            session: session.clone(),
        });
        Ok(session)
    }

    pub async fn pause(&self, device_id: &str) -> Result<Session> {
        let outcome = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(device_id) {
                None => Err(anyhow!("no live session on device {device_id}")),
                Some(slot) => match slot.state.pause(Instant::now()) {
                    Ok(()) => {
                        slot.polling.stop();
                        slot.state.set_shot_count(slot.aggregator.shot_count().await);
                        Ok(slot.state.session().clone())
                    }
                    Err(err) => Err(err),
                },
            }
        };
        self.finish_transition(outcome, "paused").await
    }

    pub async fn resume(&self, device_id: &str) -> Result<Session> {
        if !self.connection.is_device_connected(device_id).await {
            return Err(self
                .reject(format!("Cannot resume: device {device_id} is not connected"))
                .await);
        }

        let outcome = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(device_id) {
                None => Err(anyhow!("no live session on device {device_id}")),
                Some(slot) => match slot.state.resume(Instant::now()) {
                    Ok(()) => {
                        let ctx = self.poll_context(&slot.state, &slot.aggregator);
                        slot.polling.start(ctx).map(|_| slot.state.session().clone())
                    }
                    Err(err) => Err(err),
                },
            }
        };
        self.finish_transition(outcome, "resumed").await
    }

    /// Completes the session, optionally summarising its shots, and hands
    /// the result to the store. A store failure is logged, never returned.
    pub async fn stop(
        &self,
        device_id: &str,
        reason: StopReason,
        summarize: bool,
    ) -> Result<SessionReport> {
        let removed = self.slots.lock().await.remove(device_id);
        let Some(mut slot) = removed else {
            return Err(self
                .reject(format!("Cannot stop: no live session on device {device_id}"))
                .await);
        };

        let now = Instant::now();
        slot.polling.stop();
        slot.state.finish(SessionStatus::Completed, reason, now)?;
        let shots = slot.aggregator.close().await;
        slot.state.set_shot_count(slot.aggregator.shot_count().await);

        let metrics = summarize.then(|| analytics::summarize(&shots, &self.config.analytics));
        let report = SessionReport {
            session: slot.state.session().clone(),
            shots,
            metrics,
            active_ms: slot.state.active_ms(now),
        };

        info!(
            "session {} completed ({:?}) with {} shot(s)",
            report.session.id, reason, report.session.shot_count
        );

        if let Err(err) = self.store.save_session(&report.session, &report.shots).await {
            error!("failed to persist session {}: {err:#}", report.session.id);
        }

        self.events.emit(SupervisorEvent::SessionCompleted {
            session: report.session.clone(),
            metrics: report.metrics.clone(),
        });
        Ok(report)
    }

    /// Immediate abort. Skips analytics and persistence and cannot fail;
    /// `None` means nothing was live on the device.
    pub async fn emergency_stop(&self, device_id: &str) -> Option<SessionReport> {
        let mut slot = self.slots.lock().await.remove(device_id)?;

        let now = Instant::now();
        slot.polling.stop();
        if let Err(err) = slot
            .state
            .finish(SessionStatus::EmergencyStopped, StopReason::Emergency, now)
        {
            warn!("emergency stop on an already finished session: {err:#}");
        }
        let shots = slot.aggregator.close().await;
        slot.state.set_shot_count(slot.aggregator.shot_count().await);

        let report = SessionReport {
            session: slot.state.session().clone(),
            shots,
            metrics: None,
            active_ms: slot.state.active_ms(now),
        };

        warn!("session {} emergency stopped", report.session.id);
        self.events.emit(SupervisorEvent::SessionChanged {
            session: report.session.clone(),
        });
        Some(report)
    }

    /// Stops whatever is live on a device that just went away.
    pub async fn handle_device_lost(&self, device_id: &str) -> Option<SessionReport> {
        if !self.slots.lock().await.contains_key(device_id) {
            return None;
        }
        warn!("device {device_id} lost; stopping its session");
        self.stop(device_id, StopReason::ConnectionLost, true)
            .await
            .ok()
    }

    /// Stops live sessions whose device is no longer connected. Used when
    /// offline notifications may have been missed.
    pub async fn reconcile(&self) -> usize {
        let devices: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        let mut stopped = 0;
        for device_id in devices {
            if !self.connection.is_device_connected(&device_id).await
                && self.handle_device_lost(&device_id).await.is_some()
            {
                stopped += 1;
            }
        }
        stopped
    }

    /// Metrics over the shots buffered so far.
    pub async fn current_metrics(&self, device_id: &str) -> Option<SessionMetrics> {
        let shots = self.recent_shots(device_id).await?;
        Some(analytics::summarize(&shots, &self.config.analytics))
    }

    pub async fn snapshot(&self, device_id: &str) -> Option<Session> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(device_id)?;
        slot.state.set_shot_count(slot.aggregator.shot_count().await);
        Some(slot.state.session().clone())
    }

    pub async fn recent_shots(&self, device_id: &str) -> Option<Vec<ShotEvent>> {
        let aggregator = {
            let slots = self.slots.lock().await;
            slots.get(device_id)?.aggregator.clone()
        };
        Some(aggregator.recent_shots().await)
    }

    pub async fn active_sessions(&self) -> Vec<Session> {
        let mut slots = self.slots.lock().await;
        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots.values_mut() {
            slot.state.set_shot_count(slot.aggregator.shot_count().await);
            sessions.push(slot.state.session().clone());
        }
        sessions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        sessions
    }

    /// Stops every live session with [`StopReason::Shutdown`].
    pub async fn shutdown(&self) -> Vec<SessionReport> {
        let devices: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        let mut reports = Vec::new();
        for device_id in devices {
            if let Ok(report) = self.stop(&device_id, StopReason::Shutdown, true).await {
                reports.push(report);
            }
        }
        reports
    }

    fn poll_context(&self, state: &SessionState, aggregator: &ShotAggregator) -> PollContext {
        let session = state.session();
        PollContext {
            session_id: session.id.clone(),
            device_id: session.device_id.clone(),
            started_at: session.started_at,
            settings: session.settings.clone(),
            frames: self.frames.clone(),
            detector: self.detector.clone(),
            aggregator: aggregator.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }

    async fn finish_transition(&self, outcome: Result<Session>, verb: &str) -> Result<Session> {
        match outcome {
            Ok(session) => {
                info!("session {} {verb}", session.id);
                self.events.emit(SupervisorEvent::SessionChanged {
                    session: session.clone(),
                });
                Ok(session)
            }
            Err(err) => Err(self.reject(format!("{err:#}")).await),
        }
    }

    /// Records a `session` fault and hands back the matching error.
    async fn reject(&self, message: String) -> anyhow::Error {
        warn!("{message}");
        self.registry
            .record(ErrorKind::Session, Severity::High, message.clone(), false)
            .await;
        anyhow!(message)
    }
}
