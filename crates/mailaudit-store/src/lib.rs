//! Audit record storage.
//!
//! The orchestrator talks to a [`RecordStore`]. Two adapters are provided:
//!
//! - [`NotionStore`]: the hosted page database the audits live in
//! - [`SqliteStore`]: a local `SQLx` database used for offline runs and tests

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod migrations;
pub mod notion;
pub mod sqlite;
pub mod store;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use notion::NotionStore;
pub use sqlite::SqliteStore;
pub use store::{mime_for, RecordStore};
