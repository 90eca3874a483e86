pub mod device;
pub mod frame;
pub mod session;
pub mod shot;

pub use device::{Device, DeviceCapabilities, DeviceStatus, PairingPayload};
pub use frame::{Detection, EmbeddedShot, Frame};
pub use session::{ScoringZone, Session, SessionSettings, SessionStatus, StopReason};
pub use shot::{Point, ShotEvent};
