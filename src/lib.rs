//! Client-side supervisor for a camera-equipped shooting target: keeps the
//! device link healthy, drives shooting sessions, polls frames into a
//! bounded shot buffer and summarises the results.

mod utils;

pub mod analytics;
pub mod collaborators;
pub mod config;
pub mod connection;
pub mod errors;
pub mod events;
pub mod models;
pub mod polling;
pub mod session;
mod supervisor;

pub use analytics::{summarize, AnalyticsConfig, SessionMetrics};
pub use collaborators::{DevicePairing, FrameSource, NoopSessionStore, SessionStore, ShotDetector};
pub use config::{MissEscalation, SupervisorConfig};
pub use connection::{ConnectionState, ConnectionStatus, ConnectionSupervisor};
pub use errors::{ErrorKind, ErrorRecord, ErrorRegistry, ErrorReport, ErrorStats, Severity};
pub use events::{EventBus, SupervisorEvent};
pub use session::{SessionController, SessionReport};
pub use supervisor::{Collaborators, Supervisor};

/// Installs `env_logger` with an `info` default; `RUST_LOG` still wins.
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
