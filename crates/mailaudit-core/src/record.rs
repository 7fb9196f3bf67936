//! Audit record representation shared by every store backend.
//!
//! A record is an opaque id, an optional relation to the domain being
//! audited, and a map of named fields. Field names match the column names
//! of the hosted audit database.

use crate::status::AuditStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields written to or read from an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditField {
    /// "Audit Status"
    Status,
    /// "IP Blacklist Status"
    IpBlacklistStatus,
    /// "Domain Blacklist Status"
    DomainBlacklistStatus,
    /// "Issues Found"
    IssuesFound,
    /// "Raw JSON Output"
    RawOutput,
    /// "GlockApps Test ID"
    TestId,
    /// "GlockApps Seed List 1"
    SeedList1,
    /// "GlockApps Seed List 2"
    SeedList2,
    /// "GlockApps Seed List 3"
    SeedList3,
    /// "GlockApps Seed List 4"
    SeedList4,
    /// "GlockApps Seed List 5"
    SeedList5,
    /// "Inbox Placement %"
    InboxPlacement,
    /// "Spam Placement %"
    SpamPlacement,
    /// "Promotions Placement %"
    PromotionsPlacement,
    /// "Not Delivered %"
    NotDeliveredRate,
    /// "Spam Rate %"
    SpamRate,
    /// "Domain Reputation"
    DomainReputation,
    /// "IP Reputation"
    IpReputation,
    /// "SPF Status"
    SpfStatus,
    /// "DKIM Status"
    DkimStatus,
    /// "DMARC Status"
    DmarcStatus,
    /// "BIMI Status"
    BimiStatus,
    /// "Content Spam Score"
    ContentSpamScore,
    /// "Content Deliverability"
    ContentDeliverability,
    /// "Postmaster Captured At"
    ScreenshotsCapturedAt,
    /// "Error Log"
    ErrorLog,
}

/// Storage shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text
    Text,
    /// Floating point number
    Number,
    /// Single-choice option
    Select,
}

impl AuditField {
    /// Every field in the catalogue.
    pub const ALL: [AuditField; 26] = [
        AuditField::Status,
        AuditField::IpBlacklistStatus,
        AuditField::DomainBlacklistStatus,
        AuditField::IssuesFound,
        AuditField::RawOutput,
        AuditField::TestId,
        AuditField::SeedList1,
        AuditField::SeedList2,
        AuditField::SeedList3,
        AuditField::SeedList4,
        AuditField::SeedList5,
        AuditField::InboxPlacement,
        AuditField::SpamPlacement,
        AuditField::PromotionsPlacement,
        AuditField::NotDeliveredRate,
        AuditField::SpamRate,
        AuditField::DomainReputation,
        AuditField::IpReputation,
        AuditField::SpfStatus,
        AuditField::DkimStatus,
        AuditField::DmarcStatus,
        AuditField::BimiStatus,
        AuditField::ContentSpamScore,
        AuditField::ContentDeliverability,
        AuditField::ScreenshotsCapturedAt,
        AuditField::ErrorLog,
    ];

    /// The five seed list columns, in order.
    pub const SEED_LISTS: [AuditField; 5] = [
        AuditField::SeedList1,
        AuditField::SeedList2,
        AuditField::SeedList3,
        AuditField::SeedList4,
        AuditField::SeedList5,
    ];

    /// Column name in the audit database.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Status => "Audit Status",
            Self::IpBlacklistStatus => "IP Blacklist Status",
            Self::DomainBlacklistStatus => "Domain Blacklist Status",
            Self::IssuesFound => "Issues Found",
            Self::RawOutput => "Raw JSON Output",
            Self::TestId => "GlockApps Test ID",
            Self::SeedList1 => "GlockApps Seed List 1",
            Self::SeedList2 => "GlockApps Seed List 2",
            Self::SeedList3 => "GlockApps Seed List 3",
            Self::SeedList4 => "GlockApps Seed List 4",
            Self::SeedList5 => "GlockApps Seed List 5",
            Self::InboxPlacement => "Inbox Placement %",
            Self::SpamPlacement => "Spam Placement %",
            Self::PromotionsPlacement => "Promotions Placement %",
            Self::NotDeliveredRate => "Not Delivered %",
            Self::SpamRate => "Spam Rate %",
            Self::DomainReputation => "Domain Reputation",
            Self::IpReputation => "IP Reputation",
            Self::SpfStatus => "SPF Status",
            Self::DkimStatus => "DKIM Status",
            Self::DmarcStatus => "DMARC Status",
            Self::BimiStatus => "BIMI Status",
            Self::ContentSpamScore => "Content Spam Score",
            Self::ContentDeliverability => "Content Deliverability",
            Self::ScreenshotsCapturedAt => "Postmaster Captured At",
            Self::ErrorLog => "Error Log",
        }
    }

    /// How the field is stored.
    #[must_use]
    pub fn kind(self) -> FieldKind {
        match self {
            Self::InboxPlacement
            | Self::SpamPlacement
            | Self::PromotionsPlacement
            | Self::NotDeliveredRate
            | Self::SpamRate
            | Self::ContentSpamScore => FieldKind::Number,
            Self::Status
            | Self::DomainReputation
            | Self::IpReputation
            | Self::SpfStatus
            | Self::DkimStatus
            | Self::DmarcStatus
            | Self::BimiStatus
            | Self::ContentDeliverability => FieldKind::Select,
            _ => FieldKind::Text,
        }
    }

    /// Look a field up by its column name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for AuditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text
    Text(String),
    /// Number
    Number(f64),
    /// Select option name
    Select(String),
}

impl FieldValue {
    /// Text content of a text or select value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Select(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Numeric content, if any.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Ordered set of field assignments applied in one store update.
pub type FieldMap = BTreeMap<AuditField, FieldValue>;

/// An audit record as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier
    pub id: String,
    /// Human-readable audit id (title column), used for logging
    pub title: String,
    /// Identifier of the related domain entry
    pub domain_relation: Option<String>,
    /// Current field values
    pub fields: FieldMap,
}

impl Record {
    /// Create an empty record.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            domain_relation: None,
            fields: FieldMap::new(),
        }
    }

    /// Set the domain relation.
    #[must_use]
    pub fn with_domain_relation(mut self, relation: impl Into<String>) -> Self {
        self.domain_relation = Some(relation.into());
        self
    }

    /// Set a field value.
    #[must_use]
    pub fn with_field(mut self, field: AuditField, value: FieldValue) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// Parsed status field, if present and known.
    #[must_use]
    pub fn status(&self) -> Option<AuditStatus> {
        self.text(AuditField::Status)
            .and_then(|label| label.parse().ok())
    }

    /// Text or select value of a field; empty strings count as absent.
    #[must_use]
    pub fn text(&self, field: AuditField) -> Option<&str> {
        self.fields
            .get(&field)
            .and_then(FieldValue::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Numeric value of a field.
    #[must_use]
    pub fn number(&self, field: AuditField) -> Option<f64> {
        self.fields.get(&field).and_then(FieldValue::as_number)
    }
}
