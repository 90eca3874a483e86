pub mod config;
pub mod grouping;
pub mod summary;
pub mod timing;

pub use config::{AnalyticsConfig, GradeBand};
pub use grouping::DirectionalTrend;
pub use summary::{summarize, SessionMetrics};
pub use timing::TimingSplits;
