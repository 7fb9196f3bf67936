//! Blacklist lookups for the sending IP and the domain.

use crate::common::{build_http_client, check_status};
use crate::error::{ProviderError, Result};
use crate::outcome::ProviderOutcome;
use async_trait::async_trait;
use mailaudit_core::config::BlacklistConfig;
use mailaudit_core::BlacklistLookup;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;

const PROVIDER: &str = "blacklistchecker";

/// Blacklist provider.
#[async_trait]
pub trait BlacklistProvider: Send + Sync {
    /// Resolve a domain to the address mail is sent from.
    ///
    /// Uses the system resolver; failure here is the one fatal error of the
    /// audit.
    async fn resolve(&self, domain: &str) -> ProviderOutcome<IpAddr> {
        resolve_domain(domain).await.into()
    }

    /// Look an IP address or domain up against the provider's lists.
    async fn check(&self, target: &str) -> ProviderOutcome<BlacklistLookup>;
}

/// Resolve a host name, preferring an IPv4 address.
pub async fn resolve_domain(domain: &str) -> Result<IpAddr> {
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((domain, 0))
        .await
        .map_err(|e| ProviderError::Dns {
            host: domain.to_string(),
            message: e.to_string(),
        })?
        .map(|addr| addr.ip())
        .collect();

    let ip = addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ProviderError::Dns {
            host: domain.to_string(),
            message: "no addresses returned".to_string(),
        })?;

    tracing::info!(domain, %ip, "Resolved domain");
    Ok(ip)
}

/// Client for the blacklist checking API (basic auth with the key as user).
pub struct BlacklistCheckerClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BlacklistCheckerClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns error if the key is missing or the HTTP client cannot be built.
    pub fn from_config(config: &BlacklistConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::Config("BLACKLIST_CHECKER_API_KEY is not set".to_string())
        })?;
        Ok(Self {
            client: build_http_client(Some(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn fetch(&self, target: &str) -> Result<BlacklistLookup> {
        let url = format!("{}/check/{}", self.base_url, target);
        tracing::debug!(%url, "Checking blacklists");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(PROVIDER, response).await?;

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(PROVIDER, format!("Failed to parse response: {e}")))?;
        Ok(body.into_lookup(target))
    }
}

#[async_trait]
impl BlacklistProvider for BlacklistCheckerClient {
    async fn check(&self, target: &str) -> ProviderOutcome<BlacklistLookup> {
        let outcome: ProviderOutcome<BlacklistLookup> = self.fetch(target).await.into();
        match &outcome {
            ProviderOutcome::Ok(lookup) => tracing::info!(
                item = target,
                detections = lookup.detections,
                lists = lookup.total_lists,
                "Blacklist check completed"
            ),
            failure => tracing::warn!(
                item = target,
                error = %failure.failure_message().unwrap_or_default(),
                "Blacklist check failed"
            ),
        }
        outcome
    }
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    detections: u32,
    #[serde(default)]
    blacklists: Vec<ListEntry>,
    #[serde(default)]
    checks_remaining: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    detected: bool,
}

impl CheckResponse {
    fn into_lookup(self, target: &str) -> BlacklistLookup {
        let total_lists = u32::try_from(self.blacklists.len()).unwrap_or(u32::MAX);
        let detected_lists = self
            .blacklists
            .into_iter()
            .filter(|entry| entry.detected)
            .map(|entry| {
                entry
                    .name
                    .or_else(|| entry.id.map(|id| id.to_string().trim_matches('"').to_string()))
                    .unwrap_or_else(|| "Unknown".to_string())
            })
            .collect();
        BlacklistLookup {
            target: target.to_string(),
            detections: self.detections,
            detected_lists,
            total_lists,
            checks_remaining: self.checks_remaining,
        }
    }
}

/// Parse a check response body.
pub fn parse_check_response(target: &str, body: &str) -> Result<BlacklistLookup> {
    let parsed: CheckResponse = serde_json::from_str(body)?;
    Ok(parsed.into_lookup(target))
}
