#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use gmshoot_supervisor::{
    models::{Detection, Device, EmbeddedShot, Frame, PairingPayload, Session, ShotEvent},
    Collaborators, DevicePairing, FrameSource, SessionStore, ShotDetector, Supervisor,
    SupervisorConfig,
};

pub struct FakePairing {
    pub fail: bool,
}

#[async_trait]
impl DevicePairing for FakePairing {
    async fn pair(&self, payload: &PairingPayload) -> Result<Device> {
        if self.fail {
            bail!("device refused pairing");
        }
        Ok(Device::new(&payload.device_id, &payload.name, &payload.address))
    }
}

/// Hands out scripted responses after a fixed latency, then goes quiet.
pub struct ScriptedFrames {
    latency: Duration,
    script: Mutex<VecDeque<Result<Frame>>>,
}

impl ScriptedFrames {
    pub fn new(latency_ms: u64, script: Vec<Result<Frame>>) -> Arc<Self> {
        Arc::new(Self {
            latency: Duration::from_millis(latency_ms),
            script: Mutex::new(script.into()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new(10, Vec::new())
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn latest_frame(&self, _device_id: &str) -> Result<Frame> {
        tokio::time::sleep(self.latency).await;
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct CountingDetector {
    pub calls: AtomicUsize,
}

impl CountingDetector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShotDetector for CountingDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub fail: bool,
    pub saved: Mutex<Vec<(Session, Vec<ShotEvent>)>>,
}

impl MemoryStore {
    pub fn saved(&self) -> Vec<(Session, Vec<ShotEvent>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, session: &Session, shots: &[ShotEvent]) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((session.clone(), shots.to_vec()));
        if self.fail {
            return Err(anyhow!("database is locked"));
        }
        Ok(())
    }
}

pub struct Rig {
    pub supervisor: Supervisor,
    pub detector: Arc<CountingDetector>,
    pub store: Arc<MemoryStore>,
}

pub fn rig(config: SupervisorConfig, frames: Arc<ScriptedFrames>, store: MemoryStore) -> Rig {
    rig_with_pairing(config, frames, store, FakePairing { fail: false })
}

pub fn rig_with_pairing(
    config: SupervisorConfig,
    frames: Arc<ScriptedFrames>,
    store: MemoryStore,
    pairing: FakePairing,
) -> Rig {
    let detector = Arc::new(CountingDetector::default());
    let store = Arc::new(store);
    let supervisor = Supervisor::new(
        config,
        Collaborators {
            pairing: Arc::new(pairing),
            frames,
            detector: detector.clone(),
            store: store.clone(),
        },
    );
    Rig {
        supervisor,
        detector,
        store,
    }
}

pub fn payload(id: &str) -> PairingPayload {
    PairingPayload {
        device_id: id.into(),
        name: format!("Lane {id}"),
        address: "192.168.4.1:8080".into(),
    }
}

pub fn device(id: &str) -> Device {
    Device::new(id, format!("Lane {id}"), "192.168.4.1:8080")
}

pub fn scored_frame(sequence: u64, x: f64, y: f64, score: f64) -> Result<Frame> {
    Ok(Frame {
        sequence,
        timestamp: Utc::now(),
        image_ref: format!("frames/{sequence}.jpg"),
        has_shot: true,
        shot: Some(EmbeddedShot {
            x,
            y,
            score: Some(score),
            confidence: 0.97,
            zone: None,
        }),
    })
}

pub fn empty_frame(sequence: u64) -> Result<Frame> {
    Ok(Frame {
        sequence,
        timestamp: Utc::now(),
        image_ref: format!("frames/{sequence}.jpg"),
        has_shot: false,
        shot: None,
    })
}
