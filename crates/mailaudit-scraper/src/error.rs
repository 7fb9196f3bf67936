//! Scraper invocation errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a scraper run produced no usable screenshots.
#[derive(Debug, Error)]
pub enum ScraperError {
    /// The scraper process could not be started.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program that was launched
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The scraper exited with a non-zero status.
    #[error("scraper exited with {}: {}", .code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")), .class.description())]
    Exited {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Diagnostic classification of the code
        class: ExitClass,
    },

    /// The domain cannot be used as a directory name under the output dir.
    #[error("refusing to use '{0}' as a scraper output directory")]
    InvalidDomain(String),

    /// The scraper did not finish in time and was killed.
    #[error("scraper timed out after {secs}s")]
    Timeout {
        /// Configured timeout
        secs: u64,
    },

    /// The scraper exited cleanly but wrote no manifest.
    #[error("manifest not found at {}", .path.display())]
    ManifestMissing {
        /// Expected manifest location
        path: PathBuf,
    },

    /// The manifest could not be understood or reports a scraper error.
    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic meaning of a scraper exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// 1: login, network or capture failure (including "no graphs found")
    CaptureFailed,
    /// 2: command line argument error
    BadArguments,
    /// 126: permission denied or not executable
    NotExecutable,
    /// 127: program or script not found
    NotFound,
    /// Any other code, or termination by signal
    Unknown,
}

impl ExitClass {
    /// Classify an exit code.
    #[must_use]
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(1) => Self::CaptureFailed,
            Some(2) => Self::BadArguments,
            Some(126) => Self::NotExecutable,
            Some(127) => Self::NotFound,
            _ => Self::Unknown,
        }
    }

    /// Human-readable explanation for logs.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::CaptureFailed => "login failure, network issue, blocked session or capture failure",
            Self::BadArguments => "command line argument error",
            Self::NotExecutable => "permission denied or not executable",
            Self::NotFound => "scraper not found",
            Self::Unknown => "unknown error",
        }
    }
}

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, ScraperError>;
