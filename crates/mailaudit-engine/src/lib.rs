//! Audit orchestration.
//!
//! The [`Orchestrator`] polls the record store, advances at most one record
//! through one step per status, and sleeps between iterations. Provider
//! failures become flagged fallback values instead of stopping an audit.
//!
//! # Example
//!
//! ```ignore
//! use mailaudit_engine::{EngineSettings, Orchestrator, Providers};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut orchestrator = Orchestrator::new(store, providers, scraper, EngineSettings::default());
//! orchestrator.check_connections().await;
//! orchestrator.run(CancellationToken::new()).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod fields;
pub mod orchestrator;
pub mod sweep;
pub mod tracking;

// Re-export commonly used types
pub use error::{EngineError, Result};
pub use orchestrator::{ConnectionReport, EngineSettings, Orchestrator, Providers};
pub use sweep::{SweepReport, Transition};
pub use tracking::{Observation, PlacementTracker};
