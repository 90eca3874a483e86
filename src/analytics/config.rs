use serde::{Deserialize, Serialize};

/// One step of the grade table: mean score at or above `min_mean` earns
/// `label`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradeBand {
    pub min_mean: f64,
    pub label: String,
}

impl GradeBand {
    fn new(min_mean: f64, label: &str) -> Self {
        Self {
            min_mean,
            label: label.to_string(),
        }
    }
}

/// Tunable thresholds for session analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Checked top-down; the first band whose minimum is met wins.
    pub grade_bands: Vec<GradeBand>,
    /// Grade when no band matches.
    pub floor_grade: String,

    /// Mean offset (mm) under which an axis counts as centred.
    pub trend_threshold_mm: f64,

    /// Score at or above which a shot counts toward accuracy.
    pub accuracy_min_score: f64,

    /// A shot is a flyer beyond mean + k * std-dev of radial distance.
    pub flyer_std_devs: f64,

    /// Gap (seconds) between shots that starts a new round.
    pub round_gap_secs: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            grade_bands: vec![
                GradeBand::new(9.5, "A+"),
                GradeBand::new(9.0, "A"),
                GradeBand::new(8.5, "B+"),
                GradeBand::new(8.0, "B"),
                GradeBand::new(7.5, "C+"),
            ],
            floor_grade: "C".to_string(),
            trend_threshold_mm: 2.0,
            accuracy_min_score: 9.0,
            flyer_std_devs: 2.0,
            round_gap_secs: 5.0,
        }
    }
}

impl AnalyticsConfig {
    pub fn grade_for(&self, mean_score: f64) -> String {
        let mut bands: Vec<&GradeBand> = self.grade_bands.iter().collect();
        bands.sort_by(|a, b| b.min_mean.total_cmp(&a.min_mean));
        bands
            .into_iter()
            .find(|band| mean_score >= band.min_mean)
            .map(|band| band.label.clone())
            .unwrap_or_else(|| self.floor_grade.clone())
    }
}
