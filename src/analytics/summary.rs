use serde::{Deserialize, Serialize};

use crate::models::{Point, ShotEvent};

use super::{
    config::AnalyticsConfig,
    grouping::{self, DirectionalTrend},
    timing,
};

/// Derived view of a shot set. Recomputed on request, never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub shot_count: usize,
    pub total_score: f64,
    pub average_score: f64,
    pub accuracy_percentage: u32,
    pub group_size: f64,
    pub directional_trend: DirectionalTrend,
    pub time_to_first_shot: Option<f64>,
    pub split_times: Vec<f64>,
    pub average_split_time: Option<f64>,
    /// `None` until there is at least one shot.
    pub performance_grade: Option<String>,
    pub mean_point_of_impact: Option<Point>,
    pub mean_radius: f64,
    pub std_dev_x: f64,
    pub std_dev_y: f64,
    pub flyer_count: usize,
    pub round_count: u32,
}

/// Summarise a shot set. Everything but the timing fields ignores order;
/// timing re-sorts by timestamp.
pub fn summarize(shots: &[ShotEvent], config: &AnalyticsConfig) -> SessionMetrics {
    let shot_count = shots.len();
    let total_score: f64 = shots.iter().map(|shot| shot.score).sum();
    let average_score = if shot_count == 0 {
        0.0
    } else {
        total_score / shot_count as f64
    };

    let accurate = shots
        .iter()
        .filter(|shot| shot.score >= config.accuracy_min_score)
        .count();
    let accuracy_percentage = if shot_count == 0 {
        0
    } else {
        (100.0 * accurate as f64 / shot_count as f64).round() as u32
    };

    let mpi = grouping::mean_point_of_impact(shots);
    let center = mpi.unwrap_or_default();
    let (std_dev_x, std_dev_y) = grouping::std_dev_xy(shots, center);
    let splits = timing::compute_splits(shots);

    SessionMetrics {
        shot_count,
        total_score,
        average_score,
        accuracy_percentage,
        group_size: grouping::group_size(shots),
        directional_trend: DirectionalTrend::classify(center, config.trend_threshold_mm),
        time_to_first_shot: splits.time_to_first_shot,
        split_times: splits.split_times,
        average_split_time: splits.average_split_time,
        performance_grade: (shot_count > 0).then(|| config.grade_for(average_score)),
        mean_point_of_impact: mpi,
        mean_radius: grouping::mean_radius(shots, center),
        std_dev_x,
        std_dev_y,
        flyer_count: grouping::flyer_count(shots, center, config.flyer_std_devs),
        round_count: timing::round_count(shots, config.round_gap_secs),
    }
}
