mod retry;
mod types;

pub use types::{ErrorKind, ErrorRecord, ErrorReport, ErrorStats, Severity};

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::SupervisorConfig,
    events::{EventBus, SupervisorEvent},
};

use retry::{RegistryCommand, RetryScheduler};

/// Owns every recorded fault, its retry timer and its post-resolution
/// cleanup. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct ErrorRegistry {
    inner: Arc<Mutex<RegistryState>>,
    config: Arc<SupervisorConfig>,
    connectivity: watch::Receiver<bool>,
    events: EventBus,
    shutdown: CancellationToken,
}

struct RegistryState {
    records: Vec<ErrorRecord>,
    scheduler: RetryScheduler,
    cleanups: HashMap<String, JoinHandle<()>>,
}

impl RegistryState {
    fn find_mut(&mut self, id: &str) -> Option<&mut ErrorRecord> {
        self.records.iter_mut().find(|record| record.id == id)
    }
}

impl ErrorRegistry {
    /// Must be called inside a tokio runtime: spawns the command dispatcher.
    pub fn new(
        config: Arc<SupervisorConfig>,
        connectivity: watch::Receiver<bool>,
        events: EventBus,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let registry = Self {
            inner: Arc::new(Mutex::new(RegistryState {
                records: Vec::new(),
                scheduler: RetryScheduler::new(command_tx),
                cleanups: HashMap::new(),
            })),
            config,
            connectivity,
            events,
            shutdown: CancellationToken::new(),
        };

        tokio::spawn(dispatch_commands(
            registry.clone(),
            command_rx,
            registry.shutdown.clone(),
        ));

        registry
    }

    pub async fn record(
        &self,
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
        auto_retry: bool,
    ) -> ErrorRecord {
        self.report(ErrorReport::new(kind, severity, message).auto_retry(auto_retry))
            .await
    }

    pub async fn report(&self, report: ErrorReport) -> ErrorRecord {
        let record = ErrorRecord {
            id: Uuid::new_v4().to_string(),
            kind: report.kind,
            severity: report.severity,
            message: report.message,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            retry_count: 0,
            max_retries: report.max_retries.unwrap_or(self.config.max_retries),
            next_retry_at: None,
            auto_retry: report.auto_retry,
        };
        let id = record.id.clone();

        let snapshot = {
            let mut state = self.inner.lock().await;
            state.records.push(record.clone());
            self.arm_timer(&mut state, &id);
            state.find_mut(&id).cloned().unwrap_or(record)
        };

        match snapshot.severity {
            Severity::High | Severity::Critical => warn!(
                "[{}/{}] {} (id={})",
                snapshot.kind.as_str(),
                snapshot.severity.as_str(),
                snapshot.message,
                snapshot.id
            ),
            _ => info!(
                "[{}/{}] {} (id={})",
                snapshot.kind.as_str(),
                snapshot.severity.as_str(),
                snapshot.message,
                snapshot.id
            ),
        }

        self.events.emit(SupervisorEvent::ErrorRaised {
            record: snapshot.clone(),
        });
        snapshot
    }

    /// Marks the record resolved and schedules its removal. Returns false if
    /// the record is unknown or already resolved.
    pub async fn resolve(&self, id: &str) -> bool {
        {
            let mut state = self.inner.lock().await;
            let Some(record) = state.find_mut(id) else {
                return false;
            };
            if record.resolved {
                return false;
            }

            record.resolved = true;
            record.resolved_at = Some(Utc::now());
            record.next_retry_at = None;
            state.scheduler.cancel(id);

            let inner = self.inner.clone();
            let grace = self.config.resolved_grace();
            let record_id = id.to_string();
            let cleanup = tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let mut state = inner.lock().await;
                state.records.retain(|record| record.id != record_id);
                state.cleanups.remove(&record_id);
            });
            state.cleanups.insert(id.to_string(), cleanup);
        }

        info!("error {id} resolved");
        self.events.emit(SupervisorEvent::ErrorResolved { id: id.to_string() });
        true
    }

    /// Resolves every unresolved record of `kind`, returning how many.
    pub async fn resolve_kind(&self, kind: ErrorKind) -> usize {
        let ids: Vec<String> = {
            let state = self.inner.lock().await;
            state
                .records
                .iter()
                .filter(|record| record.kind == kind && !record.resolved)
                .map(|record| record.id.clone())
                .collect()
        };

        let mut resolved = 0;
        for id in ids {
            if self.resolve(&id).await {
                resolved += 1;
            }
        }
        resolved
    }

    /// One recovery attempt. Timers call this; callers may too (manual retry).
    pub async fn retry(&self, id: &str) -> Option<ErrorRecord> {
        let record = {
            let mut state = self.inner.lock().await;
            state.scheduler.cancel(id);
            let record = state.find_mut(id)?;
            if record.resolved {
                return Some(record.clone());
            }
            record.retry_count = (record.retry_count + 1).min(record.max_retries);
            record.next_retry_at = None;
            record.clone()
        };

        debug!(
            "retrying error {id} ({}/{})",
            record.retry_count, record.max_retries
        );
        self.events.emit(SupervisorEvent::ErrorRetried {
            record: record.clone(),
        });

        let recovered = if record.kind.needs_connectivity() {
            self.is_connected()
        } else {
            record.retries_exhausted()
        };

        if recovered {
            self.resolve(id).await;
        } else {
            let mut state = self.inner.lock().await;
            if !self.arm_timer(&mut state, id) && record.auto_retry {
                warn!(
                    "error {id} exhausted {} retries; surfacing as permanent",
                    record.max_retries
                );
            }
        }

        self.get(id).await
    }

    /// Manual reconnect: resolves connection errors if a device is already
    /// up, otherwise waits for one and raises a fresh error if none shows.
    pub async fn retry_all_connections(&self) -> bool {
        let reconnected = if self.is_connected() {
            true
        } else {
            let mut connectivity = self.connectivity.clone();
            let came_back = tokio::time::timeout(
                self.config.reconnect_wait(),
                connectivity.wait_for(|connected| *connected),
            )
            .await
            .map(|waited| waited.is_ok())
            .unwrap_or(false);
            came_back
        };

        if reconnected {
            let resolved = self.resolve_kind(ErrorKind::Connection).await;
            info!("reconnected; resolved {resolved} connection error(s)");
        } else {
            self.record(
                ErrorKind::Connection,
                Severity::High,
                "Reconnection failed: no device responded",
                false,
            )
            .await;
        }
        reconnected
    }

    pub async fn get(&self, id: &str) -> Option<ErrorRecord> {
        let state = self.inner.lock().await;
        state.records.iter().find(|record| record.id == id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<ErrorRecord> {
        self.inner.lock().await.records.clone()
    }

    pub async fn unresolved(&self) -> Vec<ErrorRecord> {
        let state = self.inner.lock().await;
        state
            .records
            .iter()
            .filter(|record| !record.resolved)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> ErrorStats {
        ErrorStats::from_records(self.inner.lock().await.records.iter())
    }

    /// Unresolved with no retries left: only a manual retry or resolve
    /// moves it now.
    pub async fn is_permanent(&self, id: &str) -> bool {
        self.get(id)
            .await
            .map(|record| !record.resolved && record.retries_exhausted())
            .unwrap_or(false)
    }

    /// A backoff retry is armed. Auto-clear timers do not count.
    pub async fn has_pending_retry(&self, id: &str) -> bool {
        let state = self.inner.lock().await;
        let armed = state
            .records
            .iter()
            .any(|record| record.id == id && record.next_retry_at.is_some());
        armed && state.scheduler.is_pending(id)
    }

    /// Retry and auto-clear timers still waiting to fire.
    pub async fn pending_timers(&self) -> usize {
        self.inner.lock().await.scheduler.pending_count()
    }

    pub fn is_connected(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Cancels the dispatcher, every retry timer and every pending cleanup.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut state = self.inner.lock().await;
        state.scheduler.cancel_all();
        for (_, handle) in state.cleanups.drain() {
            handle.abort();
        }
    }

    /// Arms whichever timer the record is due: a backoff retry, or the
    /// auto-clear for informational faults. Returns true if a retry was
    /// scheduled.
    fn arm_timer(&self, state: &mut RegistryState, id: &str) -> bool {
        let Some(record) = state.find_mut(id) else {
            return false;
        };
        if record.resolved {
            return false;
        }

        if record.auto_retry {
            if record.retries_exhausted() {
                record.next_retry_at = None;
                return false;
            }
            let delay = self.config.backoff_delay(record.retry_count);
            record.next_retry_at = chrono::Duration::from_std(delay)
                .ok()
                .map(|delay| Utc::now() + delay);
            state
                .scheduler
                .schedule(id, delay, RegistryCommand::Retry(id.to_string()));
            true
        } else {
            if record.severity.is_informational() {
                state.scheduler.schedule(
                    id,
                    self.config.auto_clear(),
                    RegistryCommand::Resolve(id.to_string()),
                );
            }
            false
        }
    }
}

async fn dispatch_commands(
    registry: ErrorRegistry,
    mut commands: mpsc::UnboundedReceiver<RegistryCommand>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(RegistryCommand::Retry(id)) => {
                    registry.retry(&id).await;
                }
                Some(RegistryCommand::Resolve(id)) => {
                    registry.resolve(&id).await;
                }
                None => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
    debug!("error registry dispatcher stopped");
}
