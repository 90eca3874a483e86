use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeviceStatus {
    Online,
    Connecting,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub has_camera: bool,
    pub has_zoom: bool,
    /// Width x height in pixels.
    pub max_resolution: (u32, u32),
    pub supported_formats: Vec<String>,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            has_camera: true,
            has_zoom: false,
            max_resolution: (1920, 1080),
            supported_formats: vec!["jpeg".into()],
        }
    }
}

/// A paired target unit. Status is only ever changed by the connection
/// supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub address: String,
    pub capabilities: DeviceCapabilities,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            capabilities: DeviceCapabilities::default(),
            status: DeviceStatus::Offline,
            last_seen: None,
        }
    }
}

/// What a QR code / manual entry hands to the pairing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    pub device_id: String,
    pub name: String,
    pub address: String,
}
