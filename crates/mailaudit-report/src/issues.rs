//! One-line issue summaries written to the "Issues Found" field.

use mailaudit_core::{AuthResults, AuthVerdict, PlacementStats};

/// Inbox placement below this percentage is reported.
pub const LOW_INBOX_THRESHOLD: f64 = 80.0;
/// Spam placement above this percentage is reported.
pub const HIGH_SPAM_THRESHOLD: f64 = 20.0;
/// Summary when nothing was flagged.
pub const NO_ISSUES: &str = "No significant issues found";

/// Summarize placement test findings.
///
/// Authentication findings are only reported when the payload carried
/// authentication results.
#[must_use]
pub fn placement_issues(
    stats: &PlacementStats,
    auth: Option<&AuthResults>,
    finished: bool,
) -> String {
    let mut issues = Vec::new();

    if stats.inbox_rate < LOW_INBOX_THRESHOLD {
        issues.push(format!("Low inbox placement rate ({:.1}%)", stats.inbox_rate));
    }
    if stats.spam_rate > HIGH_SPAM_THRESHOLD {
        issues.push(format!("High spam placement rate ({:.1}%)", stats.spam_rate));
    }
    if stats.not_delivered_rate > 0.0 {
        issues.push(format!(
            "Some emails not delivered ({:.1}%)",
            stats.not_delivered_rate
        ));
    }

    if let Some(auth) = auth {
        for (name, verdict) in [("SPF", auth.spf), ("DKIM", auth.dkim), ("DMARC", auth.dmarc)] {
            if verdict == AuthVerdict::Fail {
                issues.push(format!("{name} authentication failed"));
            }
        }
        if auth.bimi == AuthVerdict::NotConfigured {
            issues.push("BIMI not configured".to_string());
        }
    }

    if !finished {
        issues.push("Test not yet completed".to_string());
    }

    join_issues(&issues)
}

/// Join issue lines, or report that there are none.
#[must_use]
pub fn join_issues(issues: &[String]) -> String {
    if issues.is_empty() {
        NO_ISSUES.to_string()
    } else {
        issues.join("; ")
    }
}
