//! Launches the scraper as a child process and collects its screenshots.

use crate::error::{ExitClass, Result, ScraperError};
use crate::manifest::{Manifest, Screenshot};
use async_trait::async_trait;
use mailaudit_core::config::ScraperConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const LOG_TAIL_CHARS: usize = 1000;
const NO_GRAPHS_MARKER: &str = "No graphs found";

/// Screenshots captured for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Domain the scraper ran for
    pub domain: String,
    /// Local directory holding the artifacts
    pub dir: PathBuf,
    /// Usable screenshots in report order; may be empty
    pub screenshots: Vec<Screenshot>,
}

/// Dashboard scraper.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Run the scraper for `domain`. On failure the local artifacts are
    /// already cleaned up.
    async fn capture(&self, domain: &str) -> Result<Capture>;

    /// Delete the local artifacts for `domain`.
    async fn cleanup(&self, domain: &str) -> Result<()>;
}

/// Runs an external scraper program.
///
/// The command line is `<program> <args...> --domain <domain> [--headless]`.
pub struct ProcessScraper {
    config: ScraperConfig,
}

impl ProcessScraper {
    /// Create an invoker from configuration.
    #[must_use]
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    /// Directory the scraper writes artifacts for `domain` into. Domains
    /// that could resolve outside the output directory are rejected.
    pub fn domain_dir(&self, domain: &str) -> Result<PathBuf> {
        check_domain(domain)?;
        Ok(self.config.output_dir.join(domain))
    }

    fn command(&self, domain: &str) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args).arg("--domain").arg(domain);
        if self.config.headless {
            cmd.arg("--headless");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, domain: &str) -> Result<Capture> {
        tracing::info!(
            program = %self.config.program,
            args = ?self.config.args,
            domain,
            "Launching dashboard scraper"
        );

        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(limit, self.command(domain).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ScraperError::Spawn {
                    program: self.config.program.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::error!(domain, secs = self.config.timeout_secs, "Scraper timed out, killed");
                return Err(ScraperError::Timeout {
                    secs: self.config.timeout_secs,
                });
            }
        };

        if !output.status.success() {
            let code = output.status.code();
            let class = ExitClass::from_code(code);
            tracing::error!(domain, ?code, ?class, "Scraper failed: {}", class.description());
            log_output_tail(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            );
            return Err(ScraperError::Exited { code, class });
        }

        let dir = self.domain_dir(domain)?;
        let manifest = Manifest::load(&dir.join("latest.json")).await?;
        let screenshots = manifest.screenshots(&self.config.output_dir);
        tracing::info!(domain, count = screenshots.len(), "Scraper finished");

        Ok(Capture {
            domain: domain.to_string(),
            dir,
            screenshots,
        })
    }
}

#[async_trait]
impl Scraper for ProcessScraper {
    async fn capture(&self, domain: &str) -> Result<Capture> {
        if let Err(e) = check_domain(domain) {
            tracing::error!(domain, "Invalid domain for dashboard capture, not launching scraper");
            return Err(e);
        }
        let result = self.run(domain).await;
        if result.is_err() {
            if let Err(e) = self.cleanup(domain).await {
                tracing::warn!(domain, error = %e, "Failed to clean up scraper output");
            }
        }
        result
    }

    async fn cleanup(&self, domain: &str) -> Result<()> {
        remove_dir(&self.domain_dir(domain)?).await
    }
}

/// A domain must be a single plain path component.
fn check_domain(domain: &str) -> Result<()> {
    let invalid = domain.trim().is_empty()
        || domain == "."
        || domain.contains("..")
        || domain.contains(['/', '\\'])
        || Path::new(domain).is_absolute();
    if invalid {
        return Err(ScraperError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

/// Remove a directory tree; a missing directory is not an error.
async fn remove_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            tracing::debug!(dir = %dir.display(), "Removed scraper output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn log_output_tail(stdout: &str, stderr: &str) {
    if !stdout.is_empty() {
        tracing::info!(stdout = %tail(stdout, LOG_TAIL_CHARS), "Scraper stdout (tail)");
        if stdout.contains(NO_GRAPHS_MARKER) {
            tracing::error!("Scraper stopped because no graphs were found on the dashboard");
        }
    }
    if !stderr.is_empty() {
        tracing::error!(stderr = %tail(stderr, LOG_TAIL_CHARS), "Scraper stderr (tail)");
    }
}

/// Last `n` characters of `s`.
fn tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
