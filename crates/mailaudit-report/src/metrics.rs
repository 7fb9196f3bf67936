//! The values a report is rendered from.

use mailaudit_core::{is_fallback_test_id, AuditField, Record, SpamBand};
use serde::Serialize;

/// Shown when a blacklist status was never written.
pub const MISSING_BLACKLIST: &str = "Data not available";

/// Report inputs, read back from a record after the metric steps wrote them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetrics {
    /// Inbox placement percentage
    pub inbox_rate: f64,
    /// Spam placement percentage
    pub spam_placement: f64,
    /// Promotions placement percentage
    pub promotions_rate: f64,
    /// Not delivered percentage
    pub not_delivered_rate: f64,
    /// Overall spam rate percentage
    pub spam_rate: f64,
    /// SPF verdict label
    pub spf: String,
    /// DKIM verdict label
    pub dkim: String,
    /// DMARC verdict label
    pub dmarc: String,
    /// IP blacklist status text
    pub ip_blacklist: String,
    /// Domain blacklist status text
    pub domain_blacklist: String,
    /// Placement figures are fallback values
    pub placement_fallback: bool,
    /// Content spam score, once scanned
    pub spam_score: Option<f64>,
    /// Content deliverability band label, once scanned
    pub deliverability: Option<String>,
}

impl ReportMetrics {
    /// Read report inputs from a record. Missing numbers read as zero.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        let number = |field| record.number(field).unwrap_or(0.0);
        let label = |field| record.text(field).unwrap_or("Unknown").to_string();
        let blacklist = |field| record.text(field).unwrap_or(MISSING_BLACKLIST).to_string();

        Self {
            inbox_rate: number(AuditField::InboxPlacement),
            spam_placement: number(AuditField::SpamPlacement),
            promotions_rate: number(AuditField::PromotionsPlacement),
            not_delivered_rate: number(AuditField::NotDeliveredRate),
            spam_rate: number(AuditField::SpamRate),
            spf: label(AuditField::SpfStatus),
            dkim: label(AuditField::DkimStatus),
            dmarc: label(AuditField::DmarcStatus),
            ip_blacklist: blacklist(AuditField::IpBlacklistStatus),
            domain_blacklist: blacklist(AuditField::DomainBlacklistStatus),
            placement_fallback: record
                .text(AuditField::TestId)
                .is_some_and(is_fallback_test_id),
            spam_score: record.number(AuditField::ContentSpamScore),
            deliverability: record
                .text(AuditField::ContentDeliverability)
                .map(str::to_string),
        }
    }

    /// Whether either blacklist status is a fallback or error value.
    #[must_use]
    pub fn blacklist_fallback(&self) -> bool {
        [&self.ip_blacklist, &self.domain_blacklist]
            .iter()
            .any(|s| s.contains("Fallback") || s.contains("Error"))
    }

    /// Whether the content scan fell back.
    #[must_use]
    pub fn spam_scan_fallback(&self) -> bool {
        self.deliverability.as_deref() == Some(SpamBand::Unknown.label())
    }
}
