//! Record store error types.

use thiserror::Error;

/// Errors raised by record store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Hosted API answered with a non-success status.
    #[error("store API error: status {status}, {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Record, relation or upload not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored value could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Missing or invalid adapter settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Network error talking to the hosted API.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (reading upload files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Api {
            status: 400,
            message: "validation_error".to_string(),
        };
        assert_eq!(err.to_string(), "store API error: status 400, validation_error");
        assert_eq!(
            StoreError::NotFound("audit a-1".to_string()).to_string(),
            "not found: audit a-1"
        );
    }
}
