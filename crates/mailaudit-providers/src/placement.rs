//! Inbox placement test provider.
//!
//! A test is created under the account's first project; the provider returns
//! the seed addresses the audited domain must mail. Polling the test returns
//! aggregate placement stats and authentication verdicts once seeds arrive.

use crate::auth_probe::{is_credential_rejection, AuthProbe, AuthState};
use crate::common::{build_http_client, lenient_f64};
use crate::error::{ProviderError, Result};
use crate::outcome::ProviderOutcome;
use async_trait::async_trait;
use mailaudit_core::config::PlacementConfig;
use mailaudit_core::{AuthResults, AuthVerdict, InboxPlacement, PlacementReport, PlacementStats};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

const PROVIDER: &str = "glockapps";

/// A freshly created placement test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTest {
    /// Provider test id
    pub test_id: String,
    /// Addresses the audited domain must send to
    pub seed_addresses: Vec<String>,
}

/// Inbox placement provider.
#[async_trait]
pub trait PlacementProvider: Send + Sync {
    /// Create a manual test for a domain.
    async fn create_test(&self, domain: &str) -> ProviderOutcome<CreatedTest>;

    /// Fetch the current state of a test.
    async fn poll_test(&self, test_id: &str) -> ProviderOutcome<PlacementReport>;

    /// Check that the provider is reachable with the configured key.
    async fn check_connection(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct RawResponse {
    status: u16,
    body: String,
}

impl RawResponse {
    fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| ProviderError::parse(PROVIDER, format!("invalid JSON: {e}")))
    }
}

/// Placement test client with credential header probing and a cached
/// project id.
pub struct GlockAppsClient {
    client: Client,
    base_url: String,
    api_key: String,
    folder_id: String,
    provider_group_ids: Vec<String>,
    probe: AuthProbe,
    project_id: OnceCell<String>,
}

impl GlockAppsClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns error if the key is missing or the HTTP client cannot be built.
    pub fn from_config(config: &PlacementConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Config("GLOCKAPPS_API_KEY is not set".to_string()))?;
        Ok(Self {
            client: build_http_client(Some(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            folder_id: config.folder_id.clone(),
            provider_group_ids: config
                .provider_group_ids
                .iter()
                .map(ToString::to_string)
                .collect(),
            probe: AuthProbe::new(),
            project_id: OnceCell::new(),
        })
    }

    /// Header probing state, exposed for diagnostics.
    #[must_use]
    pub fn auth_probe(&self) -> &AuthProbe {
        &self.probe
    }

    /// Send a request, probing credential schemes until one is accepted.
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<RawResponse> {
        let mut last_error = None;
        let candidates = self.probe.candidates().await;
        let pinned = matches!(self.probe.state().await, AuthState::Pinned(_));

        for (attempt, scheme) in candidates.into_iter().enumerate() {
            self.probe.attempting(scheme).await;

            let mut request = self
                .client
                .request(method.clone(), url)
                .header("Content-Type", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }
            let request = scheme.apply(request, &self.api_key);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        header = scheme.header_name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Request failed"
                    );
                    last_error = Some(ProviderError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if (200..300).contains(&status) {
                self.probe.accept(scheme).await;
                return Ok(RawResponse { status, body: text });
            }
            if is_credential_rejection(status, &text) {
                tracing::warn!(
                    header = scheme.header_name(),
                    status,
                    "Credentials rejected, trying next header"
                );
                self.probe.reject(scheme).await;
                last_error = Some(ProviderError::AuthenticationFailed {
                    provider: PROVIDER.to_string(),
                    message: format!("status {status}"),
                });
                // A dropped pin is probed again on the next request
                if pinned {
                    break;
                }
                continue;
            }
            return Err(ProviderError::ApiError {
                provider: PROVIDER.to_string(),
                status,
                message: text,
            });
        }

        self.probe.exhausted().await;
        tracing::error!(pinned, "All request attempts failed");
        Err(last_error.unwrap_or_else(|| ProviderError::AuthenticationFailed {
            provider: PROVIDER.to_string(),
            message: "no credential header accepted".to_string(),
        }))
    }

    async fn project_id(&self) -> Result<String> {
        self.project_id
            .get_or_try_init(|| async {
                let response = self
                    .send(Method::GET, &format!("{}/projects", self.base_url), None)
                    .await?;
                let id = parse_project_id(&response.json()?)?;
                tracing::info!(project_id = %id, "Discovered placement project");
                Ok::<_, ProviderError>(id)
            })
            .await
            .cloned()
    }

    async fn create(&self, domain: &str) -> Result<CreatedTest> {
        let project_id = self.project_id().await?;
        let payload = json!({
            "providerGroupIds": self.provider_group_ids,
            "testType": "ManualTest",
            "folderId": self.folder_id,
            "linkChecker": true,
            "note": format!("Email audit test for {domain}"),
        });
        let url = format!("{}/projects/{}/manualTest", self.base_url, project_id);
        let response = self.send(Method::POST, &url, Some(&payload)).await?;
        tracing::debug!(status = response.status, "Placement test created");
        parse_created_test(&response.json()?)
    }

    async fn poll(&self, test_id: &str) -> Result<PlacementReport> {
        let project_id = self.project_id().await?;
        let url = format!(
            "{}/projects/{}/tests?testId={}",
            self.base_url, project_id, test_id
        );
        let response = self.send(Method::GET, &url, None).await?;
        parse_poll_response(response.json()?)
    }
}

#[async_trait]
impl PlacementProvider for GlockAppsClient {
    async fn create_test(&self, domain: &str) -> ProviderOutcome<CreatedTest> {
        let result = self.create(domain).await;
        match &result {
            Ok(test) => tracing::info!(
                domain,
                test_id = %test.test_id,
                seeds = test.seed_addresses.len(),
                "Created placement test"
            ),
            Err(e) => tracing::error!(domain, error = %e, "Failed to create placement test"),
        }
        result.into()
    }

    async fn poll_test(&self, test_id: &str) -> ProviderOutcome<PlacementReport> {
        let result = self.poll(test_id).await;
        if let Err(e) = &result {
            tracing::error!(test_id, error = %e, "Failed to poll placement test");
        }
        result.into()
    }

    async fn check_connection(&self) -> bool {
        match self.project_id().await {
            Ok(project_id) => {
                tracing::debug!(%project_id, "Placement provider reachable");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Placement provider connection check failed");
                false
            }
        }
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the first project's id from a projects listing.
///
/// The listing is either a bare array or an object with a `results` array;
/// each project carries `id` or `projectId`.
pub fn parse_project_id(body: &Value) -> Result<String> {
    let projects = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("results") {
            Some(Value::Array(items)) => items,
            _ => return Err(ProviderError::parse(PROVIDER, "unexpected projects payload")),
        },
        _ => return Err(ProviderError::parse(PROVIDER, "unexpected projects payload")),
    };
    let first = projects
        .first()
        .ok_or_else(|| ProviderError::parse(PROVIDER, "no projects found"))?;
    first
        .get("id")
        .and_then(id_string)
        .or_else(|| first.get("projectId").and_then(id_string))
        .ok_or_else(|| ProviderError::parse(PROVIDER, "project has no id"))
}

/// Parse the test creation response.
pub fn parse_created_test(body: &Value) -> Result<CreatedTest> {
    let test_id = body
        .get("testId")
        .and_then(id_string)
        .ok_or_else(|| ProviderError::parse(PROVIDER, format!("no test id in response: {body}")))?;

    let seed_addresses = body
        .get("emails")
        .and_then(Value::as_array)
        .map(|emails| {
            emails
                .iter()
                .filter_map(|e| match e {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("email").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if body.get("emails").is_none() {
        tracing::warn!(test_id = %test_id, "No seed list in test creation response");
    }

    Ok(CreatedTest {
        test_id,
        seed_addresses,
    })
}

/// Parse a test poll payload. Fields are read from the `result` object when
/// present, otherwise from the top level.
pub fn parse_poll_response(body: Value) -> Result<PlacementReport> {
    if !body.is_object() {
        return Err(ProviderError::parse(PROVIDER, "poll payload is not an object"));
    }
    let result = body.get("result").filter(|r| r.is_object()).unwrap_or(&body);

    let finished = result
        .get("finished")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let stats_obj = result.get("stats").filter(|s| {
        s.as_object().is_some_and(|o| !o.is_empty())
    });
    let rate = |obj: &Value, key: &str| obj.get(key).and_then(lenient_f64).unwrap_or(0.0);
    let stats = stats_obj.map(|s| PlacementStats {
        inbox_rate: rate(s, "inboxRate"),
        spam_rate: rate(s, "spamRate"),
        other_rate: rate(s, "otherRate"),
        not_delivered_rate: rate(s, "notDeliveredRate"),
    });
    let not_delivered = stats_obj.map(|s| s.get("notDelivered").and_then(Value::as_u64).unwrap_or(0));

    let auth = result
        .get("authenticationResult")
        .filter(|a| a.as_object().is_some_and(|o| !o.is_empty()))
        .map(|a| {
            let verdict = |key: &str| {
                AuthVerdict::from_token(a.get(key).and_then(Value::as_str).unwrap_or(""))
            };
            AuthResults {
                spf: verdict("spfAuth"),
                dkim: verdict("dkimAuth"),
                dmarc: verdict("dmarcAuth"),
                bimi: verdict("bimi"),
            }
        });

    let inboxes = result
        .get("inboxes")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|i| InboxPlacement {
                    folder: i
                        .get("iType")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PlacementReport {
        finished,
        stats,
        not_delivered,
        auth,
        inboxes,
        raw: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_from_results_object() {
        let body = json!({"results": [{"id": "p-1", "name": "Main"}, {"id": "p-2"}]});
        assert_eq!(parse_project_id(&body).unwrap(), "p-1");
    }

    #[test]
    fn test_project_id_from_list_with_project_id_key() {
        let body = json!([{"projectId": 42}]);
        assert_eq!(parse_project_id(&body).unwrap(), "42");
    }

    #[test]
    fn test_project_id_errors() {
        assert!(parse_project_id(&json!([])).is_err());
        assert!(parse_project_id(&json!({"items": []})).is_err());
        assert!(parse_project_id(&json!([{"name": "no id"}])).is_err());
    }

    #[test]
    fn test_parse_created_test() {
        let body = json!({
            "testId": "t-abc",
            "emails": ["a@seed.net", "b@seed.net", {"email": "c@seed.net"}]
        });
        let test = parse_created_test(&body).unwrap();
        assert_eq!(test.test_id, "t-abc");
        assert_eq!(test.seed_addresses, vec!["a@seed.net", "b@seed.net", "c@seed.net"]);
    }

    #[test]
    fn test_parse_created_test_without_id() {
        assert!(parse_created_test(&json!({"emails": []})).is_err());
    }

    #[test]
    fn test_parse_finished_poll() {
        let body = json!({
            "result": {
                "finished": true,
                "stats": {
                    "inboxRate": 72.5,
                    "spamRate": 20.0,
                    "otherRate": 7.5,
                    "notDeliveredRate": 0,
                    "notDelivered": 0
                },
                "authenticationResult": {
                    "spfAuth": "pass",
                    "dkimAuth": "fail",
                    "dmarcAuth": "softfail",
                    "bimi": ""
                },
                "inboxes": [{"iType": "Inbox"}, {"iType": "Spam"}]
            }
        });
        let report = parse_poll_response(body).unwrap();
        assert!(report.finished);
        let stats = report.stats.unwrap();
        assert!((stats.inbox_rate - 72.5).abs() < f64::EPSILON);
        assert_eq!(report.not_delivered, Some(0));
        let auth = report.auth.unwrap();
        assert_eq!(auth.spf, AuthVerdict::Pass);
        assert_eq!(auth.dkim, AuthVerdict::Fail);
        assert_eq!(auth.dmarc, AuthVerdict::SoftFail);
        assert_eq!(auth.bimi, AuthVerdict::NotConfigured);
        assert_eq!(report.inboxes.len(), 2);
    }

    #[test]
    fn test_parse_running_poll_without_stats() {
        let body = json!({"result": {"finished": false, "inboxes": [{"iType": "Inbox"}]}});
        let report = parse_poll_response(body).unwrap();
        assert!(!report.finished);
        assert!(report.stats.is_none());
        assert!(report.not_delivered.is_none());
        assert!(report.auth.is_none());
        assert!((report.effective_stats().inbox_rate - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_poll_top_level_fields() {
        let body = json!({"finished": false, "stats": {"notDelivered": 4}});
        let report = parse_poll_response(body).unwrap();
        assert_eq!(report.not_delivered, Some(4));
    }

    #[test]
    fn test_parse_poll_rejects_non_object() {
        assert!(parse_poll_response(json!("oops")).is_err());
    }
}
