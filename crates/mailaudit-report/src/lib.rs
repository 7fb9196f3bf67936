//! Audit report assembly.
//!
//! Pure functions from collected metrics to display blocks. Nothing here
//! talks to the record store.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod builder;
pub mod issues;
pub mod metrics;

// Re-export commonly used types
pub use builder::{final_report, initial_report, missing_screenshots_note, screenshots_heading};
pub use issues::{join_issues, placement_issues};
pub use metrics::ReportMetrics;
