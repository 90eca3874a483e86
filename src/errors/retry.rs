use std::{collections::HashMap, time::Duration};

use log::debug;
use tokio::{sync::mpsc, task::JoinHandle};

/// Work a timer hands back to the registry when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RegistryCommand {
    Retry(String),
    Resolve(String),
}

/// Cancellable delayed commands, at most one per error id.
///
/// Timers never touch registry state themselves; they post a command onto the
/// registry queue so every mutation goes through the single dispatcher.
pub(crate) struct RetryScheduler {
    timers: HashMap<String, JoinHandle<()>>,
    commands: mpsc::UnboundedSender<RegistryCommand>,
}

impl RetryScheduler {
    pub fn new(commands: mpsc::UnboundedSender<RegistryCommand>) -> Self {
        Self {
            timers: HashMap::new(),
            commands,
        }
    }

    /// Replaces any timer already pending for `id`.
    pub fn schedule(&mut self, id: &str, delay: Duration, command: RegistryCommand) {
        self.cancel(id);

        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(command);
        });

        debug!("scheduled timer for error {id} in {}ms", delay.as_millis());
        self.timers.insert(id.to_string(), handle);
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        match self.timers.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.timers
            .get(id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_command_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);
        scheduler.schedule("e1", Duration::from_millis(1000), RegistryCommand::Retry("e1".into()));

        assert!(scheduler.is_pending("e1"));
        assert_eq!(rx.recv().await, Some(RegistryCommand::Retry("e1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);
        scheduler.schedule("e1", Duration::from_millis(10), RegistryCommand::Retry("e1".into()));
        scheduler.schedule("e1", Duration::from_millis(500), RegistryCommand::Resolve("e1".into()));
        assert_eq!(scheduler.pending_count(), 1);

        assert_eq!(rx.recv().await, Some(RegistryCommand::Resolve("e1".into())));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);
        scheduler.schedule("e1", Duration::from_millis(100), RegistryCommand::Retry("e1".into()));
        assert!(scheduler.cancel("e1"));
        assert!(!scheduler.cancel("e1"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
