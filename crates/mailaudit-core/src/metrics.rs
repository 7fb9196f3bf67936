//! Metric types collected from the deliverability providers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication verdict for SPF, DKIM, DMARC or BIMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthVerdict {
    /// Mechanism passed
    Pass,
    /// Mechanism failed
    Fail,
    /// Neutral result, also used for unrecognized tokens
    Neutral,
    /// Soft failure
    SoftFail,
    /// Explicit "none"
    None,
    /// Mechanism absent from the payload
    NotConfigured,
}

impl AuthVerdict {
    /// Parse the provider's lower-case token. An empty token means the
    /// mechanism is not configured; anything unrecognized is neutral.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "softfail" | "soft fail" => Self::SoftFail,
            "none" => Self::None,
            "" | "not configured" | "not_configured" => Self::NotConfigured,
            _ => Self::Neutral,
        }
    }

    /// Display label stored in the record.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Neutral => "Neutral",
            Self::SoftFail => "Soft Fail",
            Self::None => "None",
            Self::NotConfigured => "Not Configured",
        }
    }
}

impl fmt::Display for AuthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authentication verdicts reported by the placement test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResults {
    /// SPF verdict
    pub spf: AuthVerdict,
    /// DKIM verdict
    pub dkim: AuthVerdict,
    /// DMARC verdict
    pub dmarc: AuthVerdict,
    /// BIMI verdict
    pub bimi: AuthVerdict,
}

impl Default for AuthResults {
    fn default() -> Self {
        Self {
            spf: AuthVerdict::NotConfigured,
            dkim: AuthVerdict::NotConfigured,
            dmarc: AuthVerdict::NotConfigured,
            bimi: AuthVerdict::NotConfigured,
        }
    }
}

/// Aggregate placement percentages (0-100).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementStats {
    /// Share of seeds that landed in the primary inbox
    pub inbox_rate: f64,
    /// Share of seeds that landed in spam
    pub spam_rate: f64,
    /// Share in other folders (promotions, updates)
    pub other_rate: f64,
    /// Share never delivered
    pub not_delivered_rate: f64,
}

/// Folder a single seed inbox reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxPlacement {
    /// Folder type as reported (`Inbox`, `Spam`, `Promotions`, ...)
    pub folder: String,
}

/// Parsed placement test poll payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementReport {
    /// Whether the provider considers the test finished
    pub finished: bool,
    /// Aggregate stats, when the provider supplies them
    pub stats: Option<PlacementStats>,
    /// Count of seeds not yet delivered
    pub not_delivered: Option<u64>,
    /// Authentication verdicts, when present
    pub auth: Option<AuthResults>,
    /// Per-seed placement list
    pub inboxes: Vec<InboxPlacement>,
    /// Untouched payload, kept for the raw output field
    pub raw: serde_json::Value,
}

impl PlacementReport {
    /// Aggregate stats, computed from the per-seed list when the provider
    /// sent none. Other-folder share counts only `Promotions`.
    #[must_use]
    pub fn effective_stats(&self) -> PlacementStats {
        if let Some(stats) = self.stats {
            return stats;
        }
        let total = self.inboxes.len();
        if total == 0 {
            return PlacementStats::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let share = |folder: &str| {
            let count = self.inboxes.iter().filter(|i| i.folder == folder).count();
            count as f64 / total as f64 * 100.0
        };
        PlacementStats {
            inbox_rate: share("Inbox"),
            spam_rate: share("Spam"),
            other_rate: share("Promotions"),
            not_delivered_rate: 0.0,
        }
    }
}

/// One blacklist lookup (for an IP address or a domain).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistLookup {
    /// Looked-up IP or domain
    pub target: String,
    /// Number of lists that flagged the target
    pub detections: u32,
    /// Names of the lists that flagged it
    pub detected_lists: Vec<String>,
    /// Number of lists consulted
    pub total_lists: u32,
    /// Remaining API quota, when reported
    pub checks_remaining: Option<u64>,
}

impl BlacklistLookup {
    /// Status text written to the record.
    #[must_use]
    pub fn status_text(&self) -> String {
        if self.detections > 0 {
            format!(
                "BLACKLISTED ({} detections): {}",
                self.detections,
                self.detected_lists.join(", ")
            )
        } else {
            format!("Detections: {}", self.detections)
        }
    }
}

/// Blacklist results for both lookups. `None` marks a failed lookup that
/// was replaced by fallback text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistResults {
    /// Lookup for the resolved IP
    pub ip: Option<BlacklistLookup>,
    /// Lookup for the domain
    pub domain: Option<BlacklistLookup>,
}

impl BlacklistResults {
    /// Text stored in place of a failed lookup.
    pub const FALLBACK_STATUS: &'static str = "Fallback - Check Failed";

    /// Whether either lookup fell back.
    #[must_use]
    pub fn fallback_used(&self) -> bool {
        self.ip.is_none() || self.domain.is_none()
    }
}

/// Content deliverability band derived from the spam score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpamBand {
    /// score < 5
    Excellent,
    /// 5 <= score < 10
    Good,
    /// 10 <= score < 15
    Fair,
    /// score >= 15
    Poor,
    /// Scan failed
    Unknown,
}

impl SpamBand {
    /// Band for a score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 5.0 {
            Self::Excellent
        } else if score < 10.0 {
            Self::Good
        } else if score < 15.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    /// Label stored in the record.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Unknown => "Unknown (API Failed)",
        }
    }
}

impl fmt::Display for SpamBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A spam rule that contributed a positive score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Points contributed
    pub score: f64,
    /// Rule description
    pub description: String,
}

/// Result of the content spam scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamScanResult {
    /// Total score
    pub score: f64,
    /// Band for the score
    pub band: SpamBand,
    /// Rules with a positive score
    pub violations: Vec<RuleViolation>,
    /// Whether this is a fallback value
    pub fallback_used: bool,
}

impl SpamScanResult {
    /// Result for a scored scan.
    #[must_use]
    pub fn scored(score: f64, violations: Vec<RuleViolation>) -> Self {
        Self {
            score,
            band: SpamBand::from_score(score),
            violations,
            fallback_used: false,
        }
    }

    /// Flagged value used when the scan could not run.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            score: 0.0,
            band: SpamBand::Unknown,
            violations: Vec::new(),
            fallback_used: true,
        }
    }
}

/// Prefix of test ids recorded when no placement test could be created.
pub const FALLBACK_TEST_PREFIX: &str = "fallback_";

/// Whether a stored test id stands in for a failed placement test.
#[must_use]
pub fn is_fallback_test_id(test_id: &str) -> bool {
    test_id.starts_with(FALLBACK_TEST_PREFIX)
}

/// Seed addresses split across the record's five seed list columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedChunks {
    groups: [String; 5],
}

impl SeedChunks {
    /// Stored in any group that holds no addresses.
    pub const UNAVAILABLE: &'static str = "unavailable";

    /// Preferred group size.
    pub const GROUP_SIZE: usize = 25;

    const SEPARATOR: &'static str = ", ";

    /// Split seeds into exactly five groups, in order.
    ///
    /// Groups hold up to 25 addresses; longer lists widen every group so no
    /// address is dropped. Unused groups hold [`Self::UNAVAILABLE`].
    #[must_use]
    pub fn split(seeds: &[String]) -> Self {
        let size = Self::GROUP_SIZE.max(seeds.len().div_ceil(5));
        let mut groups: [String; 5] = std::array::from_fn(|_| Self::UNAVAILABLE.to_string());
        for (slot, chunk) in groups.iter_mut().zip(seeds.chunks(size)) {
            *slot = chunk.join(Self::SEPARATOR);
        }
        Self { groups }
    }

    /// Build from stored column values.
    #[must_use]
    pub fn from_groups(groups: [String; 5]) -> Self {
        Self { groups }
    }

    /// The five stored groups.
    #[must_use]
    pub fn groups(&self) -> &[String; 5] {
        &self.groups
    }

    /// Rebuild the original address list.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.as_str() != Self::UNAVAILABLE && !g.is_empty())
            .flat_map(|g| g.split(Self::SEPARATOR).map(str::to_string))
            .collect()
    }
}
