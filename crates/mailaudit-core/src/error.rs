//! Core error types for the mail audit engine.
//!
//! `CoreError` covers failures shared by every subsystem; `ConfigError`
//! covers loading and validating the TOML configuration.

use thiserror::Error;

/// Central error type for shared operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A status label that is not part of the audit state machine
    #[error("unknown audit status: {0}")]
    UnknownStatus(String),

    /// A status change that would move a record backwards
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status label
        from: String,
        /// Requested status label
        to: String,
    },

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Explicitly requested config file does not exist
    #[error("config file not found at {path}")]
    NotFound {
        /// Path where config was expected
        path: String,
    },

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading or writing config
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required secret is missing from the environment
    #[error("missing required setting {name}")]
    MissingSecret {
        /// Environment variable that should hold the value
        name: String,
    },

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name with the invalid value
        field: String,
        /// Why it's invalid
        reason: String,
    },
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
