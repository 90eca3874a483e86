use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Device unreachable.
    Connection,
    /// Device answers but misbehaves (dropped frame, bad response).
    Device,
    /// Invalid lifecycle transition.
    Session,
    /// Malformed frame or detection payload.
    Data,
    /// Device rejected an operation.
    Permission,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Device => "device",
            ErrorKind::Session => "session",
            ErrorKind::Data => "data",
            ErrorKind::Permission => "permission",
        }
    }

    /// Kinds whose recovery depends on the device being reachable again.
    pub fn needs_connectivity(&self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Device)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Low and medium faults are informational and clear themselves.
    pub fn is_informational(&self) -> bool {
        *self <= Severity::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Always `None` when `auto_retry` is false.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub auto_retry: bool,
}

impl ErrorRecord {
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Builder for a fault about to be recorded.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub auto_retry: bool,
    pub max_retries: Option<u32>,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            auto_retry: false,
            max_retries: None,
        }
    }

    pub fn auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub unresolved: usize,
    pub resolved: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}

impl ErrorStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ErrorRecord>) -> Self {
        let mut stats = ErrorStats::default();
        for record in records {
            stats.total += 1;
            if record.resolved {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            *stats.by_kind.entry(record.kind).or_insert(0) += 1;
            *stats.by_severity.entry(record.severity).or_insert(0) += 1;
        }
        stats
    }
}
