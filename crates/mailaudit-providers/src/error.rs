//! Error types for the provider clients.

use thiserror::Error;

/// Errors that can occur while talking to a deliverability provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// API error with status code
    #[error("API error ({provider}): status {status}, {message}")]
    ApiError {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Every credential scheme was rejected
    #[error("authentication failed for {provider}: {message}")]
    AuthenticationFailed {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Response parsing error
    #[error("failed to parse response from {provider}: {message}")]
    ParseError {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Host name did not resolve
    #[error("could not resolve {host}: {message}")]
    Dns {
        /// Host that failed to resolve
        host: String,
        /// Resolver message
        message: String,
    },

    /// Missing or invalid client settings
    #[error("configuration error: {0}")]
    Config(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    pub(crate) fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::ParseError {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ProviderError::ApiError {
            provider: "glockapps".to_string(),
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (glockapps): status 404, not found"
        );
    }

    #[test]
    fn test_dns_error_display() {
        let err = ProviderError::Dns {
            host: "nowhere.invalid".to_string(),
            message: "no addresses".to_string(),
        };
        assert!(err.to_string().contains("nowhere.invalid"));
    }
}
