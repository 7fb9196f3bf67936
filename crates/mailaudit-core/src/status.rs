//! Audit status state machine.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an audit record.
///
/// The happy path is strictly linear:
/// `Running → TestCreated → AwaitingEmailSending → EmailsSent →
/// GlockAppsCompleted → PostmarkCompleted → Completed`.
/// `Error`, `BlacklistFailed` and `ReportError` are terminal failure states
/// reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuditStatus {
    /// Picked up for processing; blacklist checks and test creation
    Running,
    /// Placement test created, seeds stored
    TestCreated,
    /// Waiting for a human to send the test emails
    AwaitingEmailSending,
    /// Human confirmed the seed emails were sent
    EmailsSent,
    /// Placement results collected (or fallback values written)
    GlockAppsCompleted,
    /// Content spam scan finished
    PostmarkCompleted,
    /// Final report written
    Completed,
    /// Fatal failure (DNS resolution, missing domain)
    Error,
    /// Reserved; never set automatically
    BlacklistFailed,
    /// Placement test retrieval failed
    ReportError,
}

impl AuditStatus {
    /// All statuses, in state machine order.
    pub const ALL: [AuditStatus; 10] = [
        AuditStatus::Running,
        AuditStatus::TestCreated,
        AuditStatus::AwaitingEmailSending,
        AuditStatus::EmailsSent,
        AuditStatus::GlockAppsCompleted,
        AuditStatus::PostmarkCompleted,
        AuditStatus::Completed,
        AuditStatus::Error,
        AuditStatus::BlacklistFailed,
        AuditStatus::ReportError,
    ];

    /// Statuses that keep the main loop sweeping instead of idling.
    pub const IN_PROGRESS: [AuditStatus; 4] = [
        AuditStatus::AwaitingEmailSending,
        AuditStatus::EmailsSent,
        AuditStatus::GlockAppsCompleted,
        AuditStatus::PostmarkCompleted,
    ];

    /// Label stored in the record's status field.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::TestCreated => "Test Created",
            Self::AwaitingEmailSending => "Awaiting Email Sending",
            Self::EmailsSent => "Emails Sent",
            Self::GlockAppsCompleted => "GlockApps Completed",
            Self::PostmarkCompleted => "Postmark Completed",
            Self::Completed => "Completed",
            Self::Error => "Error",
            Self::BlacklistFailed => "Blacklist Failed",
            Self::ReportError => "Report Error",
        }
    }

    /// Position on the linear path, `None` for failure states.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Running => Some(0),
            Self::TestCreated => Some(1),
            Self::AwaitingEmailSending => Some(2),
            Self::EmailsSent => Some(3),
            Self::GlockAppsCompleted => Some(4),
            Self::PostmarkCompleted => Some(5),
            Self::Completed => Some(6),
            Self::Error | Self::BlacklistFailed | Self::ReportError => None,
        }
    }

    /// Whether this is one of the failure terminals.
    #[must_use]
    pub fn is_failure(self) -> bool {
        self.rank().is_none()
    }

    /// Whether the record is never revisited (without a manual reset).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Completed || self.is_failure()
    }

    /// Whether the record is parked somewhere after dispatch and before completion.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        Self::IN_PROGRESS.contains(&self)
    }

    /// Whether moving from `self` to `next` keeps the linear order.
    ///
    /// Rewriting the current status is allowed; steps may also skip forward
    /// (the fallback path jumps from `Running` to `GlockAppsCompleted`).
    #[must_use]
    pub fn can_advance_to(self, next: AuditStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target >= current,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// Checked variant of [`Self::can_advance_to`].
    pub fn advance_to(self, next: AuditStatus) -> Result<AuditStatus, CoreError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.label().to_string(),
                to: next.label().to_string(),
            })
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AuditStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.label() == s.trim())
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for AuditStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, CoreError> {
        value.parse()
    }
}

impl From<AuditStatus> for String {
    fn from(status: AuditStatus) -> Self {
        status.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for status in AuditStatus::ALL {
            assert_eq!(status.label().parse::<AuditStatus>().unwrap(), status);
        }
        assert!("Paused".parse::<AuditStatus>().is_err());
    }

    #[test]
    fn test_try_from_string() {
        assert_eq!(
            AuditStatus::try_from("Error".to_string()).unwrap(),
            AuditStatus::Error
        );
        assert!(matches!(
            AuditStatus::try_from("Queued".to_string()),
            Err(CoreError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_linear_progression() {
        let path = &AuditStatus::ALL[..7];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_advance_to(pair[0]), "{} -> {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_fallback_skip_allowed() {
        assert!(AuditStatus::Running.can_advance_to(AuditStatus::GlockAppsCompleted));
    }

    #[test]
    fn test_failure_reachable_from_non_terminal() {
        assert!(AuditStatus::Running.can_advance_to(AuditStatus::Error));
        assert!(AuditStatus::EmailsSent.can_advance_to(AuditStatus::ReportError));
        assert!(!AuditStatus::Completed.can_advance_to(AuditStatus::Error));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        assert!(!AuditStatus::Error.can_advance_to(AuditStatus::Running));
        assert!(!AuditStatus::ReportError.can_advance_to(AuditStatus::GlockAppsCompleted));
        assert!(AuditStatus::Error.advance_to(AuditStatus::Completed).is_err());
        assert!(AuditStatus::BlacklistFailed.is_terminal());
    }

    #[test]
    fn test_in_progress() {
        assert!(AuditStatus::EmailsSent.is_in_progress());
        assert!(!AuditStatus::Running.is_in_progress());
        assert!(!AuditStatus::Completed.is_in_progress());
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&AuditStatus::AwaitingEmailSending).unwrap();
        assert_eq!(json, "\"Awaiting Email Sending\"");
        let back: AuditStatus = serde_json::from_str("\"Report Error\"").unwrap();
        assert_eq!(back, AuditStatus::ReportError);
    }
}
