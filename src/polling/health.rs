use std::collections::VecDeque;

use crate::config::MissEscalation;

/// Sliding window over recent poll outcomes. Escalates once when the miss
/// count in the window reaches the threshold; a successful poll re-arms it.
#[derive(Debug)]
pub struct MissWindow {
    policy: Option<MissEscalation>,
    outcomes: VecDeque<bool>,
    escalated: bool,
}

impl MissWindow {
    pub fn new(policy: Option<MissEscalation>) -> Self {
        Self {
            policy,
            outcomes: VecDeque::new(),
            escalated: false,
        }
    }

    pub fn record_success(&mut self) {
        self.push(false);
        self.escalated = false;
    }

    /// Returns true exactly when this miss crosses the threshold.
    pub fn record_miss(&mut self) -> bool {
        self.push(true);
        let Some(policy) = self.policy else {
            return false;
        };
        if self.escalated || policy.max_misses == 0 {
            return false;
        }
        if self.misses() >= policy.max_misses {
            self.escalated = true;
            return true;
        }
        false
    }

    pub fn misses(&self) -> usize {
        self.outcomes.iter().filter(|missed| **missed).count()
    }

    fn push(&mut self, missed: bool) {
        let Some(policy) = self.policy else {
            return;
        };
        self.outcomes.push_back(missed);
        while self.outcomes.len() > policy.window.max(1) {
            self.outcomes.pop_front();
        }
    }
}
