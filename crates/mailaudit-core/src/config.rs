//! Configuration management for the mail audit engine.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. API credentials are never read from the
//! file; they come from the environment only.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// Loaded from `~/.config/mailaudit/config.toml` (or platform equivalent)
/// unless an explicit path is given. Missing sections use defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Record store settings
    pub store: StoreConfig,
    /// Blacklist provider settings
    pub blacklist: BlacklistConfig,
    /// Inbox placement provider settings
    pub placement: PlacementConfig,
    /// Spam scan provider settings
    pub spam_scan: SpamScanConfig,
    /// Dashboard scraper settings
    pub scraper: ScraperConfig,
    /// Main loop cadence
    pub polling: PollingConfig,
}

impl AppConfig {
    /// Load configuration from the default location, falling back to
    /// defaults if the file does not exist.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration and apply environment overrides.
    ///
    /// Supports the following environment variables:
    /// - `NOTION_API_KEY`: record store token
    /// - `NOTION_AUDITS_DB_ID`: audit database id
    /// - `GLOCKAPPS_API_KEY`: placement provider key
    /// - `GLOCKAPPS_FOLDER_ID`: placement provider folder
    /// - `BLACKLIST_CHECKER_API_KEY`: blacklist provider key
    /// - `POSTMARK_API_KEY`: spam scan key (optional)
    /// - `MAILAUDIT_STORE_BACKEND`: `notion` or `sqlite`
    /// - `MAILAUDIT_SQLITE_PATH`: local store path
    /// - `MAILAUDIT_SCRAPER_PROGRAM`: scraper executable
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(val) = get("NOTION_API_KEY") {
            self.store.notion_token = Some(val);
        }
        if let Some(val) = get("NOTION_AUDITS_DB_ID") {
            tracing::debug!("Override store.database_id from env: {}", val);
            self.store.database_id = Some(val);
        }
        if let Some(val) = get("GLOCKAPPS_API_KEY") {
            self.placement.api_key = Some(val);
        }
        if let Some(val) = get("GLOCKAPPS_FOLDER_ID") {
            tracing::debug!("Override placement.folder_id from env: {}", val);
            self.placement.folder_id = val;
        }
        if let Some(val) = get("BLACKLIST_CHECKER_API_KEY") {
            self.blacklist.api_key = Some(val);
        }
        if let Some(val) = get("POSTMARK_API_KEY") {
            self.spam_scan.api_key = Some(val);
        }
        if let Some(val) = get("MAILAUDIT_STORE_BACKEND") {
            match val.parse() {
                Ok(backend) => {
                    self.store.backend = backend;
                    tracing::debug!("Override store.backend from env: {}", val);
                }
                Err(e) => tracing::warn!("Ignoring MAILAUDIT_STORE_BACKEND: {}", e),
            }
        }
        if let Some(val) = get("MAILAUDIT_SQLITE_PATH") {
            tracing::debug!("Override store.sqlite_path from env: {}", val);
            self.store.sqlite_path = PathBuf::from(val);
        }
        if let Some(val) = get("MAILAUDIT_SCRAPER_PROGRAM") {
            tracing::debug!("Override scraper.program from env: {}", val);
            self.scraper.program = val;
        }
    }

    /// Check that the settings needed by the selected backend are present.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.backend == StoreBackend::Notion {
            if self.store.notion_token.is_none() {
                return Err(ConfigError::MissingSecret {
                    name: "NOTION_API_KEY".to_string(),
                });
            }
            if self.store.database_id.is_none() {
                return Err(ConfigError::MissingSecret {
                    name: "NOTION_AUDITS_DB_ID".to_string(),
                });
            }
        }
        if self.polling.min_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.min_poll_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.placement.provider_group_ids.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "placement.provider_group_ids".to_string(),
                reason: "at least one provider group is required".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to the default location.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/mailaudit/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "mailaudit", "mailaudit").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Which record store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hosted page database over HTTPS
    #[default]
    Notion,
    /// Local `SQLite` file
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notion" => Ok(Self::Notion),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection
    pub backend: StoreBackend,
    /// Hosted API base URL
    pub notion_base_url: String,
    /// Audit database id
    pub database_id: Option<String>,
    /// Local database path
    pub sqlite_path: PathBuf,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// API token (environment only)
    #[serde(skip)]
    pub notion_token: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Notion,
            notion_base_url: "https://api.notion.com/v1".to_string(),
            database_id: None,
            sqlite_path: PathBuf::from("mailaudit.db"),
            timeout_secs: 30,
            notion_token: None,
        }
    }
}

/// Blacklist provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// API key (environment only)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.blacklistchecker.com".to_string(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

/// Inbox placement provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// API base URL
    pub base_url: String,
    /// Folder new tests are filed under
    pub folder_id: String,
    /// Mailbox provider groups seeded by each test
    pub provider_group_ids: Vec<u32>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// API key (environment only)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.glockapps.com/gateway/spamtest-v2/api".to_string(),
            folder_id: "6887906d53f7d8a722230f51".to_string(),
            provider_group_ids: vec![
                2, 3, 4, 5, 6, 7, 8, 9, 11, 13, 17, 19, 24, 25, 30, 33, 34, 42, 45, 47, 50, 52, 53,
                54, 55, 56, 57, 59, 60, 61, 62, 63, 64,
            ],
            timeout_secs: 30,
            api_key: None,
        }
    }
}

/// Spam scan provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamScanConfig {
    /// API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sender address used in the synthetic email, `{domain}` is substituted
    pub from_template: String,
    /// Recipient address used in the synthetic email
    pub to_address: String,
    /// API key (environment only, unused by the public endpoint)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SpamScanConfig {
    fn default() -> Self {
        Self {
            base_url: "https://spamcheck.postmarkapp.com".to_string(),
            timeout_secs: 30,
            from_template: "audit@{domain}".to_string(),
            to_address: "test@example.com".to_string(),
            api_key: None,
        }
    }
}

/// Dashboard scraper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Executable to launch
    pub program: String,
    /// Arguments placed before `--domain`
    pub args: Vec<String>,
    /// Directory the scraper writes `<domain>/latest.json` under
    pub output_dir: PathBuf,
    /// Pass `--headless`
    pub headless: bool,
    /// Kill the scraper after this many seconds
    pub timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec!["postmaster_scraper.py".to_string()],
            output_dir: PathBuf::from("screenshots/postmaster"),
            headless: true,
            timeout_secs: 600,
        }
    }
}

/// Main loop cadence, all values in seconds except the attempt count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Sleep when nothing is in progress
    pub idle_interval_secs: u64,
    /// Wait after dispatching a new record before the first sweep
    pub post_dispatch_wait_secs: u64,
    /// Wait between sweeps
    pub sweep_interval_secs: u64,
    /// Minimum time between polls of the same placement test
    pub min_poll_interval_secs: u64,
    /// Sweep attempts after a dispatch
    pub sweep_max_attempts: u32,
    /// Total sweep time after a dispatch
    pub sweep_max_duration_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 30,
            post_dispatch_wait_secs: 30,
            sweep_interval_secs: 30,
            min_poll_interval_secs: 10,
            sweep_max_attempts: 10,
            sweep_max_duration_secs: 300,
        }
    }
}

impl PollingConfig {
    /// Idle sleep.
    #[must_use]
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    /// Post-dispatch wait.
    #[must_use]
    pub fn post_dispatch_wait(&self) -> Duration {
        Duration::from_secs(self.post_dispatch_wait_secs)
    }

    /// Wait between sweeps.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Per-test poll throttle.
    #[must_use]
    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(self.min_poll_interval_secs)
    }

    /// Sweep time budget.
    #[must_use]
    pub fn sweep_max_duration(&self) -> Duration {
        Duration::from_secs(self.sweep_max_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Notion);
        assert_eq!(config.polling.min_poll_interval(), Duration::from_secs(10));
        assert_eq!(config.polling.sweep_max_attempts, 10);
        assert_eq!(config.placement.provider_group_ids.len(), 33);
        assert!(config.scraper.headless);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [store]
            backend = "sqlite"
            sqlite_path = "/tmp/audits.db"

            [polling]
            idle_interval_secs = 5
        "#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse TOML");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.sqlite_path, PathBuf::from("/tmp/audits.db"));
        assert_eq!(config.polling.idle_interval_secs, 5);
        assert_eq!(config.polling.sweep_interval_secs, 30);
        assert_eq!(config.scraper.timeout_secs, 600);
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = AppConfig::default();
        config.store.notion_token = Some("secret_abc".to_string());
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(!toml_str.contains("secret_abc"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scraper]\nprogram = \"./scrape.sh\"\nargs = []\n").expect("write");

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.scraper.program, "./scrape.sh");
        assert!(config.scraper.args.is_empty());
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NOTION_API_KEY", "tok"),
            ("NOTION_AUDITS_DB_ID", "db-1"),
            ("GLOCKAPPS_FOLDER_ID", "folder-9"),
            ("MAILAUDIT_STORE_BACKEND", "sqlite"),
            ("BLACKLIST_CHECKER_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|name| vars.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.store.notion_token.as_deref(), Some("tok"));
        assert_eq!(config.store.database_id.as_deref(), Some("db-1"));
        assert_eq!(config.placement.folder_id, "folder-9");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.blacklist.api_key.is_none());
    }

    #[test]
    fn test_validate_requires_notion_secrets() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret { ref name } if name == "NOTION_API_KEY"));

        let mut local = AppConfig::default();
        local.store.backend = StoreBackend::Sqlite;
        assert!(local.validate().is_ok());
    }
}
