use anyhow::{bail, Result};
use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{Session, SessionSettings, SessionStatus, StopReason};

/// A session plus the bookkeeping needed to know how long it was actually
/// live. Every status change goes through the lifecycle edge table.
#[derive(Debug, Clone)]
pub struct SessionState {
    session: Session,
    /// Active time from earlier windows; combines with `running_anchor`.
    active_ms_baseline: u64,
    running_anchor: Option<Instant>,
}

impl SessionState {
    pub fn new(device_id: impl Into<String>, settings: SessionSettings) -> Self {
        Self {
            session: Session {
                id: Uuid::new_v4().to_string(),
                device_id: device_id.into(),
                started_at: Utc::now(),
                ended_at: None,
                status: SessionStatus::Idle,
                shot_count: 0,
                settings,
                end_reason: None,
            },
            active_ms_baseline: 0,
            running_anchor: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn set_shot_count(&mut self, shot_count: u32) {
        self.session.shot_count = shot_count;
    }

    pub fn begin(&mut self, now: Instant) -> Result<()> {
        self.transition(SessionStatus::Active)?;
        self.session.started_at = Utc::now();
        self.session.shot_count = 0;
        self.active_ms_baseline = 0;
        self.running_anchor = Some(now);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<()> {
        self.transition(SessionStatus::Paused)?;
        self.fold_anchor(now);
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<()> {
        self.transition(SessionStatus::Active)?;
        self.running_anchor = Some(now);
        Ok(())
    }

    pub fn finish(&mut self, status: SessionStatus, reason: StopReason, now: Instant) -> Result<()> {
        if !status.is_terminal() {
            bail!("{} is not a terminal session status", status.as_str());
        }
        self.transition(status)?;
        self.fold_anchor(now);
        self.session.ended_at = Some(Utc::now());
        self.session.end_reason = Some(reason);
        Ok(())
    }

    /// Time spent active, excluding pauses.
    pub fn active_ms(&self, now: Instant) -> u64 {
        match self.running_anchor {
            Some(anchor) => self
                .active_ms_baseline
                .saturating_add(now.saturating_duration_since(anchor).as_millis() as u64),
            None => self.active_ms_baseline,
        }
    }

    fn fold_anchor(&mut self, now: Instant) {
        self.active_ms_baseline = self.active_ms(now);
        self.running_anchor = None;
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        let current = self.session.status;
        if !current.can_transition_to(next) {
            bail!(
                "session {} cannot go from {} to {}",
                self.session.id,
                current.as_str(),
                next.as_str()
            );
        }
        self.session.status = next;
        Ok(())
    }
}
