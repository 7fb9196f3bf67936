//! The manifest the scraper leaves at `<output_dir>/<domain>/latest.json`.
//!
//! Version 1 layout:
//!
//! ```json
//! {
//!   "version": 1,
//!   "domain": "example.com",
//!   "timestamp": "2025-01-01T10:00:00",
//!   "base_dir": "screenshots/postmaster",
//!   "screenshots": {
//!     "spam_rate": "example.com/spam_rate.png",
//!     "ip_reputation": "failed",
//!     "domain_reputation": "error: timeout"
//!   }
//! }
//! ```
//!
//! Manifests without a `version` key come from older scraper builds and are
//! read as version 1. A manifest holding only `{"error": "..."}` reports a
//! scraper-side failure.

use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Manifest schema version this crate understands.
pub const MANIFEST_VERSION: u32 = 1;

/// Postmaster dashboards, in the order they appear in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dashboard {
    /// User-reported spam rate
    SpamRate,
    /// Sending IP reputation
    IpReputation,
    /// Domain reputation
    DomainReputation,
    /// SPF/DKIM/DMARC authenticated traffic
    AuthenticatedTraffic,
}

impl Dashboard {
    /// Report order.
    pub const ORDER: [Dashboard; 4] = [
        Dashboard::SpamRate,
        Dashboard::IpReputation,
        Dashboard::DomainReputation,
        Dashboard::AuthenticatedTraffic,
    ];

    /// Key used in the manifest.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::SpamRate => "spam_rate",
            Self::IpReputation => "ip_reputation",
            Self::DomainReputation => "domain_reputation",
            Self::AuthenticatedTraffic => "authenticated_traffic",
        }
    }

    /// Image caption.
    #[must_use]
    pub fn caption(self) -> &'static str {
        match self {
            Self::SpamRate => "Spam Rate",
            Self::IpReputation => "IP Reputation",
            Self::DomainReputation => "Domain Reputation",
            Self::AuthenticatedTraffic => "Authenticated Traffic",
        }
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One dashboard entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// Captured; path relative to the manifest base directory
    Captured(PathBuf),
    /// Capture failed without details
    Failed,
    /// Capture failed with a message
    Error(String),
}

impl ManifestEntry {
    fn from_raw(raw: &str) -> Self {
        if raw.is_empty() || raw == "failed" {
            Self::Failed
        } else if let Some(message) = raw.strip_prefix("error:") {
            Self::Error(message.trim().to_string())
        } else {
            Self::Captured(PathBuf::from(raw))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    version: Option<u32>,
    domain: Option<String>,
    timestamp: Option<String>,
    base_dir: Option<PathBuf>,
    screenshots: Option<BTreeMap<String, String>>,
    error: Option<String>,
}

/// A parsed scraper manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Schema version
    pub version: u32,
    /// Domain the scraper ran for
    pub domain: Option<String>,
    /// When the scraper wrote the manifest
    pub timestamp: Option<String>,
    /// Directory screenshot paths are relative to
    pub base_dir: Option<PathBuf>,
    /// Entries by manifest key
    pub entries: BTreeMap<String, ManifestEntry>,
}

/// A captured dashboard image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Which dashboard
    pub dashboard: Dashboard,
    /// Path to the image
    pub path: PathBuf,
}

impl Screenshot {
    /// Image caption.
    #[must_use]
    pub fn caption(&self) -> &'static str {
        self.dashboard.caption()
    }
}

impl Manifest {
    /// Parse manifest JSON.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(json)
            .map_err(|e| ScraperError::ManifestInvalid(e.to_string()))?;

        if let Some(error) = raw.error {
            return Err(ScraperError::ManifestInvalid(format!(
                "scraper reported: {error}"
            )));
        }

        let version = raw.version.unwrap_or(MANIFEST_VERSION);
        if version != MANIFEST_VERSION {
            return Err(ScraperError::ManifestInvalid(format!(
                "unsupported manifest version {version}"
            )));
        }

        let screenshots = raw.screenshots.ok_or_else(|| {
            ScraperError::ManifestInvalid("manifest has no screenshots".to_string())
        })?;

        Ok(Self {
            version,
            domain: raw.domain,
            timestamp: raw.timestamp,
            base_dir: raw.base_dir,
            entries: screenshots
                .into_iter()
                .map(|(key, value)| (key, ManifestEntry::from_raw(&value)))
                .collect(),
        })
    }

    /// Read and parse the manifest file at `path`.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScraperError::ManifestMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&json)
    }

    /// Captured dashboards in report order, skipping failed entries and
    /// files that do not exist. Relative paths resolve against the
    /// manifest's `base_dir`, or `default_base` when it has none.
    #[must_use]
    pub fn screenshots(&self, default_base: &Path) -> Vec<Screenshot> {
        let base = self.base_dir.as_deref().unwrap_or(default_base);
        Dashboard::ORDER
            .into_iter()
            .filter_map(|dashboard| match self.entries.get(dashboard.key()) {
                Some(ManifestEntry::Captured(rel)) => {
                    let path = base.join(rel);
                    if path.is_file() {
                        Some(Screenshot { dashboard, path })
                    } else {
                        tracing::warn!(%dashboard, path = %path.display(), "Screenshot file missing");
                        None
                    }
                }
                Some(ManifestEntry::Error(message)) => {
                    tracing::warn!(%dashboard, %message, "Dashboard capture failed");
                    None
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1() {
        let manifest = Manifest::parse(
            r#"{
                "version": 1,
                "domain": "example.com",
                "timestamp": "2025-01-01T10:00:00",
                "base_dir": "/tmp/shots",
                "screenshots": {
                    "spam_rate": "example.com/spam_rate.png",
                    "ip_reputation": "failed",
                    "domain_reputation": "error: timed out"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.domain.as_deref(), Some("example.com"));
        assert_eq!(
            manifest.entries["spam_rate"],
            ManifestEntry::Captured(PathBuf::from("example.com/spam_rate.png"))
        );
        assert_eq!(manifest.entries["ip_reputation"], ManifestEntry::Failed);
        assert_eq!(
            manifest.entries["domain_reputation"],
            ManifestEntry::Error("timed out".to_string())
        );
    }

    #[test]
    fn test_parse_legacy_without_version() {
        let manifest =
            Manifest::parse(r#"{"domain": "example.com", "screenshots": {}}"#).unwrap();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert!(manifest.entries.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let err = Manifest::parse(r#"{"version": 2, "screenshots": {}}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported manifest version 2"));
    }

    #[test]
    fn test_parse_error_manifest() {
        let err = Manifest::parse(r#"{"error": "No graphs found"}"#).unwrap_err();
        assert!(matches!(err, ScraperError::ManifestInvalid(m) if m.contains("No graphs found")));
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        assert!(Manifest::parse(r#"{"domain": "example.com"}"#).is_err());
        assert!(Manifest::parse(r#"{"screenshots": {"spam_rate": 3}}"#).is_err());
        assert!(Manifest::parse("not json").is_err());
    }

    #[test]
    fn test_screenshots_ordered_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let domain_dir = dir.path().join("example.com");
        std::fs::create_dir_all(&domain_dir).unwrap();
        std::fs::write(domain_dir.join("auth.png"), b"png").unwrap();
        std::fs::write(domain_dir.join("spam.png"), b"png").unwrap();

        let manifest = Manifest::parse(
            r#"{
                "screenshots": {
                    "authenticated_traffic": "example.com/auth.png",
                    "spam_rate": "example.com/spam.png",
                    "ip_reputation": "example.com/missing.png",
                    "domain_reputation": "failed"
                }
            }"#,
        )
        .unwrap();

        let shots = manifest.screenshots(dir.path());
        let captions: Vec<&str> = shots.iter().map(Screenshot::caption).collect();
        assert_eq!(captions, vec!["Spam Rate", "Authenticated Traffic"]);
        assert_eq!(shots[0].path, domain_dir.join("spam.png"));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("latest.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::ManifestMissing { .. }));
    }
}
