use serde::{Deserialize, Serialize};

use crate::models::ShotEvent;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimingSplits {
    /// Seconds from session start to the earliest shot.
    pub time_to_first_shot: Option<f64>,
    pub split_times: Vec<f64>,
    /// `None` with fewer than two shots.
    pub average_split_time: Option<f64>,
}

/// Sorted copy of the shot timestamps; arrival order is not trusted.
fn sorted_timestamps(shots: &[ShotEvent]) -> Vec<f64> {
    let mut timestamps: Vec<f64> = shots.iter().map(|shot| shot.timestamp).collect();
    timestamps.sort_by(|a, b| a.total_cmp(b));
    timestamps
}

pub fn compute_splits(shots: &[ShotEvent]) -> TimingSplits {
    let timestamps = sorted_timestamps(shots);
    let split_times: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    let average_split_time = if split_times.is_empty() {
        None
    } else {
        Some(split_times.iter().sum::<f64>() / split_times.len() as f64)
    };

    TimingSplits {
        time_to_first_shot: timestamps.first().copied(),
        split_times,
        average_split_time,
    }
}

/// A pause longer than `gap_secs` between consecutive shots starts a new
/// round.
pub fn round_count(shots: &[ShotEvent], gap_secs: f64) -> u32 {
    let timestamps = sorted_timestamps(shots);
    if timestamps.is_empty() {
        return 0;
    }
    1 + timestamps.windows(2).filter(|w| w[1] - w[0] > gap_secs).count() as u32
}
