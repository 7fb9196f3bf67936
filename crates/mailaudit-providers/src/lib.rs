//! Deliverability provider clients.
//!
//! Three providers feed an audit:
//!
//! - [`BlacklistProvider`]: DNS resolution plus blacklist lookups for the
//!   sending IP and the domain
//! - [`PlacementProvider`]: seed-list inbox placement tests
//! - [`SpamScanner`]: content spam scoring
//!
//! Every call returns a [`ProviderOutcome`]; callers fall back on any
//! failure instead of aborting the audit.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod auth_probe;
pub mod blacklist;
pub mod common;
pub mod error;
pub mod outcome;
pub mod placement;
pub mod spam_scan;

// Re-export commonly used types
pub use auth_probe::{AuthProbe, AuthScheme, AuthState, PINNED_ATTEMPTS};
pub use blacklist::{BlacklistCheckerClient, BlacklistProvider};
pub use error::{ProviderError, Result};
pub use outcome::ProviderOutcome;
pub use placement::{CreatedTest, GlockAppsClient, PlacementProvider};
pub use spam_scan::{audit_email, PostmarkSpamCheck, SpamScanner};
