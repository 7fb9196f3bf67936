//! Normalized result shape shared by every provider call.

use crate::error::ProviderError;

/// Outcome of a provider call.
///
/// Callers handle `HttpError` and `TransportError` the same way (they fall
/// back); the split only exists for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome<T> {
    /// Call succeeded
    Ok(T),
    /// Provider answered with a non-success status
    HttpError {
        /// HTTP status code
        code: u16,
        /// Response body
        body: String,
    },
    /// No usable answer (DNS, timeout, connection, unparseable payload)
    TransportError {
        /// Error description
        message: String,
    },
}

impl<T> ProviderOutcome<T> {
    /// Whether the call failed in either way.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Ok(_))
    }

    /// Successful value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// Map the successful value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ProviderOutcome<U> {
        match self {
            Self::Ok(value) => ProviderOutcome::Ok(f(value)),
            Self::HttpError { code, body } => ProviderOutcome::HttpError { code, body },
            Self::TransportError { message } => ProviderOutcome::TransportError { message },
        }
    }

    /// Short description of a failure, `None` on success.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Ok(_) => None,
            Self::HttpError { code, body } => {
                let body: String = body.chars().take(200).collect();
                Some(format!("HTTP {code}: {body}"))
            }
            Self::TransportError { message } => Some(message.clone()),
        }
    }
}

impl<T> From<Result<T, ProviderError>> for ProviderOutcome<T> {
    fn from(result: Result<T, ProviderError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(ProviderError::ApiError {
                status, message, ..
            }) => Self::HttpError {
                code: status,
                body: message,
            },
            Err(other) => Self::TransportError {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_becomes_http_error() {
        let outcome: ProviderOutcome<()> = Err(ProviderError::ApiError {
            provider: "postmark".into(),
            status: 503,
            message: "unavailable".into(),
        })
        .into();
        assert_eq!(
            outcome,
            ProviderOutcome::HttpError {
                code: 503,
                body: "unavailable".into()
            }
        );
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_other_errors_become_transport_errors() {
        let outcome: ProviderOutcome<()> = Err(ProviderError::Dns {
            host: "x.invalid".into(),
            message: "nxdomain".into(),
        })
        .into();
        assert!(matches!(outcome, ProviderOutcome::TransportError { .. }));
        assert!(outcome.failure_message().unwrap().contains("x.invalid"));
    }

    #[test]
    fn test_map_and_ok() {
        let outcome: ProviderOutcome<u32> = ProviderOutcome::Ok(2);
        assert_eq!(outcome.map(|v| v * 2).ok(), Some(4));
    }
}
