use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Paused,
    Completed,
    EmergencyStopped,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::EmergencyStopped => "emergency_stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::EmergencyStopped)
    }

    /// Active or paused: the device is occupied by this session.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }

    /// Edge table of the session lifecycle. Idle is only ever a source.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active | Paused, Completed)
                | (Active | Paused, EmergencyStopped)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    UserRequested,
    ConnectionLost,
    Shutdown,
    Emergency,
}

/// A scoring ring: everything within `radius_mm` of the centre scores
/// `score` unless an inner ring already matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringZone {
    pub label: String,
    pub radius_mm: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub target_distance_m: f64,
    pub target_size_mm: f64,
    /// Empty means ten evenly spaced rings over the target face.
    pub scoring_zones: Vec<ScoringZone>,
    /// Minimum detection confidence (0-1) for a detection to count.
    pub detection_sensitivity: f64,
    /// Detections this close to a buffered shot are the same hole.
    pub duplicate_radius_mm: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            target_distance_m: 10.0,
            target_size_mm: 170.0,
            scoring_zones: Vec::new(),
            detection_sensitivity: 0.5,
            duplicate_radius_mm: 3.0,
        }
    }
}

impl SessionSettings {
    /// Zones ordered innermost first.
    pub fn effective_zones(&self) -> Vec<ScoringZone> {
        let mut zones = if self.scoring_zones.is_empty() {
            let ring_width = self.target_size_mm / 20.0;
            (0..10)
                .map(|ring| ScoringZone {
                    label: format!("{}-ring", 10 - ring),
                    radius_mm: ring_width * (ring + 1) as f64,
                    score: (10 - ring) as f64,
                })
                .collect()
        } else {
            self.scoring_zones.clone()
        };
        zones.sort_by(|a, b| a.radius_mm.total_cmp(&b.radius_mm));
        zones
    }

    /// Returns `(score, zone label)` for an impact `distance_mm` from centre.
    pub fn score_at(&self, distance_mm: f64) -> (f64, String) {
        self.effective_zones()
            .into_iter()
            .find(|zone| distance_mm <= zone.radius_mm)
            .map(|zone| (zone.score.clamp(0.0, 10.0), zone.label))
            .unwrap_or_else(|| (0.0, "Miss".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub shot_count: u32,
    pub settings: SessionSettings,
    pub end_reason: Option<StopReason>,
}
