//! Per-test poll throttling and completion-stability tracking.
//!
//! A placement test counts as complete when the provider says it finished,
//! or when its not-delivered count has been identical for the last
//! [`STABILITY_WINDOW`] polls. State lives in memory and is lost on restart;
//! a restarted process simply rebuilds the window.

use mailaudit_core::PlacementReport;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Number of equal consecutive not-delivered counts that mark a test stable.
pub const STABILITY_WINDOW: usize = 3;

/// What a poll result means for the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Provider reports the test finished
    Finished,
    /// Not-delivered count has stopped moving
    Stabilized,
    /// Keep waiting
    Pending,
}

impl Observation {
    /// Whether the results can be written back.
    #[must_use]
    pub fn is_complete(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Default)]
struct TestState {
    last_check: Option<Instant>,
    history: VecDeque<u64>,
}

/// Poll bookkeeping for every placement test seen by one orchestrator.
#[derive(Debug)]
pub struct PlacementTracker {
    min_interval: Duration,
    tests: HashMap<String, TestState>,
}

impl PlacementTracker {
    /// Create a tracker that polls each test at most once per `min_interval`.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            tests: HashMap::new(),
        }
    }

    /// Whether `test_id` may be polled now. Records the poll time when it may.
    pub fn try_begin_poll(&mut self, test_id: &str) -> bool {
        let now = Instant::now();
        let state = self.tests.entry(test_id.to_string()).or_default();
        if let Some(last) = state.last_check {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        state.last_check = Some(now);
        true
    }

    /// Fold a poll result into the test's history.
    pub fn observe(&mut self, test_id: &str, report: &PlacementReport) -> Observation {
        if report.finished {
            return Observation::Finished;
        }

        let state = self.tests.entry(test_id.to_string()).or_default();
        state.history.push_back(report.not_delivered.unwrap_or(0));
        while state.history.len() > STABILITY_WINDOW {
            state.history.pop_front();
        }

        let stable = state.history.len() == STABILITY_WINDOW
            && state.history.iter().all(|n| Some(n) == state.history.front());
        if stable {
            Observation::Stabilized
        } else {
            Observation::Pending
        }
    }

    /// Drop all state for a test that left the polling stage.
    pub fn forget(&mut self, test_id: &str) {
        self.tests.remove(test_id);
    }

    /// Current not-delivered history of a test, oldest first.
    #[must_use]
    pub fn history(&self, test_id: &str) -> Vec<u64> {
        self.tests
            .get(test_id)
            .map(|s| s.history.iter().copied().collect())
            .unwrap_or_default()
    }
}
