//! Postmaster dashboard scraper invoker.
//!
//! The scraper itself is an external program driving a browser. This crate
//! launches it for a domain, classifies failures, reads the manifest it
//! writes and manages the local screenshot directory.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod invoker;
pub mod manifest;

// Re-export commonly used types
pub use error::{ExitClass, Result, ScraperError};
pub use invoker::{Capture, ProcessScraper, Scraper};
pub use manifest::{Dashboard, Manifest, ManifestEntry, Screenshot};
