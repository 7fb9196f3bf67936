//! Content spam scoring.

use crate::common::{build_http_client, check_status, lenient_f64};
use crate::error::{ProviderError, Result};
use crate::outcome::ProviderOutcome;
use async_trait::async_trait;
use mailaudit_core::config::SpamScanConfig;
use mailaudit_core::{PlacementStats, RuleViolation, SpamScanResult};
use reqwest::Client;
use serde_json::{json, Value};

const PROVIDER: &str = "postmark";

/// Spam scoring provider.
#[async_trait]
pub trait SpamScanner: Send + Sync {
    /// Score a raw RFC 822 style message.
    async fn scan(&self, raw_email: &str) -> ProviderOutcome<SpamScanResult>;

    /// Check that the provider is reachable.
    async fn check_connection(&self) -> bool {
        true
    }
}

/// Client for the public `SpamAssassin` filter endpoint.
pub struct PostmarkSpamCheck {
    client: Client,
    base_url: String,
}

impl PostmarkSpamCheck {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: &SpamScanConfig) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::debug!("No spam scan API key configured, using the public endpoint");
        }
        Ok(Self {
            client: build_http_client(Some(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn filter(&self, raw_email: &str) -> Result<SpamScanResult> {
        let response = self
            .client
            .post(format!("{}/filter", self.base_url))
            .header("Accept", "application/json")
            .json(&json!({ "email": raw_email, "options": "long" }))
            .send()
            .await?;
        let response = check_status(PROVIDER, response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(PROVIDER, format!("Failed to parse response: {e}")))?;
        parse_filter_response(&body)
    }
}

#[async_trait]
impl SpamScanner for PostmarkSpamCheck {
    async fn scan(&self, raw_email: &str) -> ProviderOutcome<SpamScanResult> {
        let result = self.filter(raw_email).await;
        match &result {
            Ok(scan) => tracing::info!(
                score = scan.score,
                band = %scan.band,
                violations = scan.violations.len(),
                "Spam scan completed"
            ),
            Err(e) => tracing::warn!(error = %e, "Spam scan failed"),
        }
        result.into()
    }

    async fn check_connection(&self) -> bool {
        let url = format!("{}/doc/", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = response.status().as_u16(), "Spam scan endpoint check failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Spam scan endpoint unreachable");
                false
            }
        }
    }
}

fn either<'a>(obj: &'a Value, lower: &str, upper: &str) -> Option<&'a Value> {
    obj.get(lower).or_else(|| obj.get(upper))
}

/// Parse the filter response. The score may be a number or a numeric
/// string; keys may be lower- or capital-initial.
pub fn parse_filter_response(body: &Value) -> Result<SpamScanResult> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("scan rejected");
        return Err(ProviderError::parse(PROVIDER, message));
    }

    let score = either(body, "score", "Score")
        .and_then(lenient_f64)
        .unwrap_or(0.0);

    let violations = either(body, "rules", "Rules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| {
                    let points = either(rule, "score", "Score")
                        .and_then(lenient_f64)
                        .unwrap_or(0.0);
                    if points <= 0.0 {
                        return None;
                    }
                    let description = either(rule, "description", "Description")
                        .and_then(Value::as_str)
                        .filter(|d| !d.is_empty())
                        .unwrap_or("Unknown")
                        .to_string();
                    Some(RuleViolation {
                        score: points,
                        description,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(SpamScanResult::scored(score, violations))
}

/// Build the synthetic message scored for a domain from its placement stats.
#[must_use]
pub fn audit_email(domain: &str, from: &str, to: &str, stats: &PlacementStats) -> String {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: Email Audit Test - {domain}\r\n\
         \r\n\
         Dear Test Recipient,\r\n\
         \r\n\
         This is an automated email audit test for the domain {domain}.\r\n\
         \r\n\
         Inbox Placement Test Results:\r\n\
         - Inbox Placement Rate: {:.1}%\r\n\
         - Spam Placement Rate: {:.1}%\r\n\
         - Not Delivered Rate: {:.1}%\r\n\
         \r\n\
         Best regards,\r\n\
         Email Audit System\r\n",
        stats.inbox_rate, stats.spam_rate, stats.not_delivered_rate
    )
}
