use std::{collections::VecDeque, sync::Arc};

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Point, ShotEvent};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// A scored impact waiting to be numbered by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotDraft {
    /// Seconds since the session started.
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub score: f64,
    pub confidence: f64,
    pub zone: String,
}

/// Bounded, insertion-ordered buffer of one session's most recent shots.
///
/// The aggregator numbers shots and is the only thing that moves the
/// session's shot count. Once closed it rejects further appends, which is
/// how a frame that was in flight when polling stopped gets discarded.
#[derive(Clone)]
pub struct ShotAggregator {
    inner: Arc<Mutex<AggregatorState>>,
}

struct AggregatorState {
    session_id: String,
    shots: VecDeque<ShotEvent>,
    capacity: usize,
    shot_count: u32,
    /// Survives pause/resume so a restarted loop does not replay a frame.
    last_sequence: Option<u64>,
    closed: bool,
}

impl ShotAggregator {
    pub fn open(session_id: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(AggregatorState {
                session_id: session_id.into(),
                shots: VecDeque::with_capacity(capacity),
                capacity,
                shot_count: 0,
                last_sequence: None,
                closed: false,
            })),
        }
    }

    pub async fn append(&self, session_id: &str, draft: ShotDraft) -> Result<ShotEvent> {
        let mut state = self.inner.lock().await;
        if state.closed {
            bail!("shot buffer for session {} is closed", state.session_id);
        }
        if state.session_id != session_id {
            bail!(
                "shot for session {session_id} offered to buffer of session {}",
                state.session_id
            );
        }

        state.shot_count += 1;
        let shot = ShotEvent {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            timestamp: draft.timestamp,
            recorded_at: Utc::now(),
            x: draft.x,
            y: draft.y,
            score: draft.score,
            confidence: draft.confidence,
            zone: draft.zone,
            shot_number: state.shot_count,
            distance_from_center: draft.x.hypot(draft.y),
            angle_from_center: draft.y.atan2(draft.x).to_degrees(),
        };

        if state.shots.len() >= state.capacity {
            if let Some(evicted) = state.shots.pop_front() {
                log_debug!(
                    "shot buffer full ({}), evicted shot #{}",
                    state.capacity,
                    evicted.shot_number
                );
            }
        }
        state.shots.push_back(shot.clone());

        log_debug!(
            "session {} shot #{} at ({:.1}, {:.1}) scored {}",
            session_id,
            shot.shot_number,
            shot.x,
            shot.y,
            shot.score
        );
        Ok(shot)
    }

    /// Stops accepting shots and hands back the final buffer.
    pub async fn close(&self) -> Vec<ShotEvent> {
        let mut state = self.inner.lock().await;
        state.closed = true;
        state.shots.iter().cloned().collect()
    }

    /// Records the newest frame sequence seen and returns the previous one.
    pub async fn note_sequence(&self, sequence: u64) -> Option<u64> {
        self.inner.lock().await.last_sequence.replace(sequence)
    }

    /// True if a buffered shot lies within `radius` of `(x, y)`.
    pub async fn contains_near(&self, x: f64, y: f64, radius: f64) -> bool {
        let point = Point::new(x, y);
        let state = self.inner.lock().await;
        state
            .shots
            .iter()
            .any(|shot| shot.position().distance_to(&point) <= radius)
    }

    pub async fn recent_shots(&self) -> Vec<ShotEvent> {
        self.inner.lock().await.shots.iter().cloned().collect()
    }

    /// Every shot ever appended, including evicted ones.
    pub async fn shot_count(&self) -> u32 {
        self.inner.lock().await.shot_count
    }
}
