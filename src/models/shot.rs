use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One detected impact. Immutable once the aggregator has numbered it.
///
/// `timestamp` is seconds since the owning session started; coordinates are
/// millimetres from the target centre with +x to the right and +y up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShotEvent {
    pub id: String,
    pub session_id: String,
    pub timestamp: f64,
    pub recorded_at: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub score: f64,
    pub confidence: f64,
    pub zone: String,
    pub shot_number: u32,
    pub distance_from_center: f64,
    pub angle_from_center: f64,
}

impl ShotEvent {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}
