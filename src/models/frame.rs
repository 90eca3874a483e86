use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest-frame response from the device. Only lives long enough to be
/// scored and aggregated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Opaque handle to the image (URL, blob key, ...). Never decoded here.
    pub image_ref: String,
    pub has_shot: bool,
    pub shot: Option<EmbeddedShot>,
}

/// Shot data a device may attach to a frame. When `score` is present the
/// device already scored it and detection is skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedShot {
    pub x: f64,
    pub y: f64,
    pub score: Option<f64>,
    pub confidence: f64,
    pub zone: Option<String>,
}

/// Raw output of the detection collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class: String,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
}

impl Detection {
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}
