//! Mail Audit Core Library
//!
//! Shared foundation for the mail audit engine: the audit status state
//! machine, the record field catalogue, metric types collected from the
//! providers, report content blocks, configuration and error types.
//!
//! # Example
//!
//! ```
//! use mailaudit_core::{AuditStatus, SeedChunks};
//!
//! assert!(AuditStatus::Running.can_advance_to(AuditStatus::TestCreated));
//! assert!(!AuditStatus::Completed.can_advance_to(AuditStatus::Running));
//!
//! let chunks = SeedChunks::split(&[]);
//! assert!(chunks.groups().iter().all(|g| g == SeedChunks::UNAVAILABLE));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod blocks;
pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod status;

// Re-export commonly used types
pub use blocks::{Block, FileHandle};
pub use config::AppConfig;
pub use error::{ConfigError, ConfigResult, CoreError, Result};
pub use metrics::{
    is_fallback_test_id, AuthResults, AuthVerdict, BlacklistLookup, BlacklistResults,
    InboxPlacement, PlacementReport, PlacementStats, RuleViolation, SeedChunks, SpamBand,
    SpamScanResult, FALLBACK_TEST_PREFIX,
};
pub use record::{AuditField, FieldKind, FieldMap, FieldValue, Record};
pub use status::AuditStatus;
