//! Field sets written by each step.
//!
//! Every function here is pure: it turns provider results into the exact
//! map the step hands to [`RecordStore::update_fields`]. Each map is written
//! in one update, so re-running a step overwrites rather than appends.
//!
//! [`RecordStore::update_fields`]: mailaudit_store::RecordStore::update_fields

use chrono::{DateTime, Utc};
use mailaudit_core::{
    AuditField, AuditStatus, BlacklistLookup, BlacklistResults, FieldMap, FieldValue,
    PlacementReport, SeedChunks, SpamScanResult, FALLBACK_TEST_PREFIX,
};
use mailaudit_providers::CreatedTest;
use mailaudit_report::{join_issues, placement_issues};

/// Longest raw payload excerpt stored on a record.
pub const RAW_OUTPUT_LIMIT: usize = 2000;

fn text(value: impl Into<String>) -> FieldValue {
    FieldValue::Text(value.into())
}

fn select(value: impl Into<String>) -> FieldValue {
    FieldValue::Select(value.into())
}

fn status(status: AuditStatus) -> FieldValue {
    select(status.label())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn excerpt(value: &str) -> String {
    value.chars().take(RAW_OUTPUT_LIMIT).collect()
}

/// Blacklist statuses, issue lines and remaining quota.
#[must_use]
pub fn blacklist_fields(results: &BlacklistResults) -> FieldMap {
    let status_text = |lookup: Option<&BlacklistLookup>| {
        lookup.map_or_else(
            || BlacklistResults::FALLBACK_STATUS.to_string(),
            BlacklistLookup::status_text,
        )
    };
    let remaining = |lookup: Option<&BlacklistLookup>| match lookup {
        None => BlacklistResults::FALLBACK_STATUS.to_string(),
        Some(l) => l
            .checks_remaining
            .map_or_else(|| "Unknown".to_string(), |n| n.to_string()),
    };

    let mut issues = Vec::new();
    for (label, lookup) in [("IP", results.ip.as_ref()), ("Domain", results.domain.as_ref())] {
        match lookup {
            None => issues.push(format!("{label} Blacklist check failed, using fallback values")),
            Some(l) if l.detections > 0 => issues.push(format!(
                "{label} Blacklisted on: {}",
                l.detected_lists.join(", ")
            )),
            Some(_) => {}
        }
    }

    let mut fields = FieldMap::new();
    fields.insert(
        AuditField::IpBlacklistStatus,
        text(status_text(results.ip.as_ref())),
    );
    fields.insert(
        AuditField::DomainBlacklistStatus,
        text(status_text(results.domain.as_ref())),
    );
    // Only written when something was flagged so a clean run leaves the field alone
    if !issues.is_empty() {
        fields.insert(AuditField::IssuesFound, text(issues.join("; ")));
    }
    fields.insert(
        AuditField::RawOutput,
        text(format!(
            "IP Checks Remaining: {}, Domain Checks Remaining: {}",
            remaining(results.ip.as_ref()),
            remaining(results.domain.as_ref())
        )),
    );
    fields
}

/// The sending domain could not be resolved.
#[must_use]
pub fn dns_failure_fields(domain: &str, message: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::Error));
    fields.insert(
        AuditField::ErrorLog,
        text(format!("Could not resolve domain {domain}: {message}")),
    );
    fields
}

/// The record has no usable domain relation.
#[must_use]
pub fn missing_domain_fields() -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::Error));
    fields.insert(
        AuditField::ErrorLog,
        text("No domain linked to this audit record"),
    );
    fields
}

/// A placement test was created.
#[must_use]
pub fn test_created_fields(test: &CreatedTest) -> FieldMap {
    let mut fields = seed_fields(&SeedChunks::split(&test.seed_addresses));
    fields.insert(AuditField::Status, status(AuditStatus::TestCreated));
    fields.insert(AuditField::TestId, text(&test.test_id));
    fields.insert(AuditField::ErrorLog, text(""));
    fields
}

/// Hand the test over to the operator who sends the seed emails.
#[must_use]
pub fn awaiting_send_fields() -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::AwaitingEmailSending));
    fields
}

fn seed_fields(chunks: &SeedChunks) -> FieldMap {
    AuditField::SEED_LISTS
        .into_iter()
        .zip(chunks.groups().iter())
        .map(|(field, group)| (field, text(group.as_str())))
        .collect()
}

fn zeroed_placement(fields: &mut FieldMap) {
    for field in [
        AuditField::InboxPlacement,
        AuditField::SpamPlacement,
        AuditField::PromotionsPlacement,
        AuditField::NotDeliveredRate,
        AuditField::SpamRate,
    ] {
        fields.insert(field, FieldValue::Number(0.0));
    }
}

/// Test id recorded in place of a placement test that could not be created.
#[must_use]
pub fn fallback_test_id(unix_ts: i64) -> String {
    format!("{FALLBACK_TEST_PREFIX}{unix_ts}")
}

/// Placement test creation failed; skip straight to the spam scan.
#[must_use]
pub fn placement_fallback_fields(error: &str, unix_ts: i64) -> FieldMap {
    let mut fields = seed_fields(&SeedChunks::split(&[]));
    fields.insert(AuditField::Status, status(AuditStatus::GlockAppsCompleted));
    fields.insert(AuditField::TestId, text(fallback_test_id(unix_ts)));
    zeroed_placement(&mut fields);
    fields.insert(
        AuditField::ErrorLog,
        text(format!("GlockApps Error: {error} - Using fallback values")),
    );
    fields
}

/// A record flipped to Emails Sent while carrying a fallback test id.
#[must_use]
pub fn fallback_sent_fields() -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::GlockAppsCompleted));
    zeroed_placement(&mut fields);
    fields.insert(
        AuditField::ErrorLog,
        text("Using fallback values - GlockApps test creation failed"),
    );
    fields
}

/// Placement test finished (or stabilized).
#[must_use]
pub fn placement_completed_fields(report: &PlacementReport) -> FieldMap {
    let stats = report.effective_stats();
    let auth = report.auth.unwrap_or_default();

    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::GlockAppsCompleted));
    fields.insert(
        AuditField::InboxPlacement,
        FieldValue::Number(round2(stats.inbox_rate)),
    );
    fields.insert(
        AuditField::SpamPlacement,
        FieldValue::Number(round2(stats.spam_rate)),
    );
    fields.insert(
        AuditField::PromotionsPlacement,
        FieldValue::Number(round2(stats.other_rate)),
    );
    fields.insert(
        AuditField::NotDeliveredRate,
        FieldValue::Number(round2(stats.not_delivered_rate)),
    );
    fields.insert(AuditField::SpamRate, FieldValue::Number(round2(stats.spam_rate)));
    fields.insert(AuditField::DomainReputation, select("N/A"));
    fields.insert(AuditField::IpReputation, select("N/A"));
    fields.insert(AuditField::SpfStatus, select(auth.spf.label()));
    fields.insert(AuditField::DkimStatus, select(auth.dkim.label()));
    fields.insert(AuditField::DmarcStatus, select(auth.dmarc.label()));
    fields.insert(AuditField::BimiStatus, select(auth.bimi.label()));
    fields.insert(AuditField::ContentSpamScore, FieldValue::Number(0.0));
    fields.insert(
        AuditField::RawOutput,
        text(excerpt(&report.raw.to_string())),
    );
    fields.insert(AuditField::ErrorLog, text(""));
    fields.insert(
        AuditField::IssuesFound,
        text(placement_issues(&stats, report.auth.as_ref(), report.finished)),
    );
    fields
}

/// Placement results could not be retrieved.
#[must_use]
pub fn poll_failure_fields(test_id: &str, message: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::ReportError));
    fields.insert(
        AuditField::ErrorLog,
        text(format!(
            "Failed to retrieve GlockApps results for test {test_id}: {message}"
        )),
    );
    fields
}

/// Content scan finished, with real or fallback values.
#[must_use]
pub fn spam_scan_fields(result: &SpamScanResult) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::PostmarkCompleted));
    fields.insert(AuditField::ContentSpamScore, FieldValue::Number(result.score));
    fields.insert(AuditField::ContentDeliverability, select(result.band.label()));
    if result.fallback_used {
        fields.insert(
            AuditField::ErrorLog,
            text("PostmarkApp check failed - Using fallback values"),
        );
    } else {
        let rules: Vec<String> = result
            .violations
            .iter()
            .map(|v| format!("{} ({})", v.description, v.score))
            .collect();
        if !rules.is_empty() {
            fields.insert(
                AuditField::IssuesFound,
                text(excerpt(&format!("Content rules triggered: {}", join_issues(&rules)))),
            );
        }
    }
    fields
}

/// Audit finished. `captured_at` is set when dashboard screenshots were
/// attached to the report.
#[must_use]
pub fn completed_fields(captured_at: Option<DateTime<Utc>>) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::Completed));
    if let Some(at) = captured_at {
        fields.insert(AuditField::ScreenshotsCapturedAt, text(at.to_rfc3339()));
    }
    fields
}

/// Audit finished without dashboard screenshots.
#[must_use]
pub fn scraper_failure_fields(domain: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(AuditField::Status, status(AuditStatus::Completed));
    fields.insert(
        AuditField::ErrorLog,
        text(format!(
            "Postmaster scraper failed for domain {domain}. Screenshots unavailable. \
             Check logs for details."
        )),
    );
    fields
}
