//! What a sweep changed.

use mailaudit_core::AuditStatus;

/// One status change performed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Record id
    pub record_id: String,
    /// Status before the write
    pub from: AuditStatus,
    /// Status after the write
    pub to: AuditStatus,
}

/// Status changes made during one sweep over the in-progress records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Transitions in the order they were written
    pub transitions: Vec<Transition>,
}

impl SweepReport {
    /// Add a transition.
    pub fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Whether nothing moved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether a record reached `Completed` during this sweep.
    #[must_use]
    pub fn reached_completed(&self) -> bool {
        self.transitions
            .iter()
            .any(|t| t.to == AuditStatus::Completed)
    }

    /// Whether a record entered a failure status during this sweep.
    #[must_use]
    pub fn reached_failure(&self) -> bool {
        self.transitions.iter().any(|t| t.to.is_failure())
    }
}
