//! Common utilities shared across provider clients.

use crate::error::{ProviderError, Result};
use reqwest::{Client, Response};
use std::time::Duration;

/// Build a standard HTTP client with common timeout settings.
///
/// # Arguments
/// * `timeout_secs` - Timeout in seconds (defaults to 30 if not specified)
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_http_client(timeout_secs: Option<u64>) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.unwrap_or(30)))
        .build()
        .map_err(|e| ProviderError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Turn a non-success response into `ApiError`, passing successes through.
pub async fn check_status(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ProviderError::ApiError {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: error_text,
    })
}

/// Read a JSON number that may also arrive as a numeric string.
#[must_use]
pub fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
