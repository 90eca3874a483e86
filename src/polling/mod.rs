pub mod aggregator;
pub mod controller;
pub mod health;
pub mod loop_worker;

pub use aggregator::{ShotAggregator, ShotDraft};
pub use controller::PollingController;
pub use health::MissWindow;
pub use loop_worker::{poll_loop, PollContext};
