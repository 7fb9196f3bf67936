//! Mailaudit application shell
//!
//! Loads configuration, wires the concrete store, providers and scraper,
//! and runs the audit loop until Ctrl-C. Audit logic lives in `crates/`.

use anyhow::Context;
use clap::Parser;
use mailaudit_core::config::StoreBackend;
use mailaudit_core::AppConfig;
use mailaudit_engine::{EngineSettings, Orchestrator, Providers};
use mailaudit_providers::{BlacklistCheckerClient, GlockAppsClient, PostmarkSpamCheck};
use mailaudit_scraper::ProcessScraper;
use mailaudit_store::{NotionStore, RecordStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mailaudit")]
#[command(version, about = "Runs email deliverability audits from a record store")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single loop iteration and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Check provider connections and exit
    #[arg(long, default_value_t = false)]
    check: bool,
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailaudit=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Notion => {
            info!("Using hosted record store");
            Arc::new(NotionStore::from_config(&config.store)?)
        }
        StoreBackend::Sqlite => {
            info!(path = %config.store.sqlite_path.display(), "Using local record store");
            Arc::new(SqliteStore::connect(&config.store.sqlite_path).await?)
        }
    };
    Ok(store)
}

fn build_providers(config: &AppConfig) -> anyhow::Result<Providers> {
    Ok(Providers {
        blacklist: Arc::new(
            BlacklistCheckerClient::from_config(&config.blacklist)
                .context("blacklist provider")?,
        ),
        placement: Arc::new(
            GlockAppsClient::from_config(&config.placement).context("placement provider")?,
        ),
        spam: Arc::new(
            PostmarkSpamCheck::from_config(&config.spam_scan).context("spam scan provider")?,
        ),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the variables may come from the environment
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    info!("Starting Mailaudit v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_with_env(cli.config.as_deref()).context("loading configuration")?;
    config.validate().context("invalid configuration")?;

    let store = open_store(&config).await.context("opening record store")?;
    let providers = build_providers(&config)?;
    let scraper = Arc::new(ProcessScraper::new(config.scraper.clone()));
    let mut orchestrator = Orchestrator::new(
        store,
        providers,
        scraper,
        EngineSettings::from_config(&config),
    );

    let connections = orchestrator.check_connections().await;
    if cli.check {
        info!(
            placement = connections.placement,
            spam_scan = connections.spam_scan,
            "Connection check finished"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
        trigger.cancel();
    });

    if cli.once {
        let pause = orchestrator.run_iteration(&shutdown).await;
        info!(next_in_secs = pause.as_secs(), "Single iteration finished");
    } else {
        orchestrator.run(shutdown).await;
    }
    Ok(())
}
