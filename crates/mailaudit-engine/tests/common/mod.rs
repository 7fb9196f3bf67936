//! Hand-written providers and scraper for driving the orchestrator against
//! an in-memory store.
#![allow(dead_code)]

use async_trait::async_trait;
use mailaudit_core::config::PollingConfig;
use mailaudit_core::{
    AuditStatus, AuthResults, AuthVerdict, BlacklistLookup, PlacementReport, PlacementStats,
    SpamScanResult,
};
use mailaudit_engine::{EngineSettings, Orchestrator, Providers};
use mailaudit_providers::{
    BlacklistProvider, CreatedTest, PlacementProvider, ProviderOutcome, SpamScanner,
};
use mailaudit_scraper::{
    Capture, Dashboard, ExitClass, Screenshot, Scraper, ScraperError,
};
use mailaudit_store::SqliteStore;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub fn ok<T>(value: T) -> ProviderOutcome<T> {
    ProviderOutcome::Ok(value)
}

pub fn transport_error<T>(message: &str) -> ProviderOutcome<T> {
    ProviderOutcome::TransportError {
        message: message.to_string(),
    }
}

pub struct MockBlacklist {
    pub ip: Option<IpAddr>,
    pub listed: Vec<String>,
}

impl MockBlacklist {
    pub fn clean() -> Self {
        Self {
            ip: Some("203.0.113.7".parse().unwrap()),
            listed: Vec::new(),
        }
    }

    pub fn unresolvable() -> Self {
        Self {
            ip: None,
            listed: Vec::new(),
        }
    }
}

#[async_trait]
impl BlacklistProvider for MockBlacklist {
    async fn resolve(&self, domain: &str) -> ProviderOutcome<IpAddr> {
        match self.ip {
            Some(ip) => ProviderOutcome::Ok(ip),
            None => transport_error(&format!("no addresses found for {domain}")),
        }
    }

    async fn check(&self, target: &str) -> ProviderOutcome<BlacklistLookup> {
        ProviderOutcome::Ok(BlacklistLookup {
            target: target.to_string(),
            detections: u32::try_from(self.listed.len()).unwrap(),
            detected_lists: self.listed.clone(),
            total_lists: 50,
            checks_remaining: Some(90),
        })
    }
}

#[derive(Default)]
pub struct MockPlacement {
    pub fail_create: bool,
    pub polls: Mutex<VecDeque<ProviderOutcome<PlacementReport>>>,
    pub create_calls: AtomicU32,
    pub poll_calls: AtomicU32,
}

impl MockPlacement {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn with_polls(polls: Vec<ProviderOutcome<PlacementReport>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            ..Self::default()
        }
    }

    pub fn creates(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlacementProvider for MockPlacement {
    async fn create_test(&self, _domain: &str) -> ProviderOutcome<CreatedTest> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return ProviderOutcome::HttpError {
                code: 500,
                body: "internal error".into(),
            };
        }
        ProviderOutcome::Ok(CreatedTest {
            test_id: "test-42".into(),
            seed_addresses: (0..40).map(|i| format!("seed{i}@seeds.example.net")).collect(),
        })
    }

    async fn poll_test(&self, _test_id: &str) -> ProviderOutcome<PlacementReport> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| transport_error("no scripted poll left"))
    }
}

pub fn placement(finished: bool, not_delivered: u64) -> PlacementReport {
    PlacementReport {
        finished,
        stats: Some(PlacementStats {
            inbox_rate: 90.0,
            spam_rate: 10.0,
            other_rate: 0.0,
            not_delivered_rate: 0.0,
        }),
        not_delivered: Some(not_delivered),
        auth: Some(AuthResults {
            spf: AuthVerdict::Pass,
            dkim: AuthVerdict::Pass,
            dmarc: AuthVerdict::Pass,
            bimi: AuthVerdict::Pass,
        }),
        inboxes: Vec::new(),
        raw: serde_json::json!({ "finished": finished, "notDelivered": not_delivered }),
    }
}

pub struct MockSpam {
    pub score: Option<f64>,
}

#[async_trait]
impl SpamScanner for MockSpam {
    async fn scan(&self, raw_email: &str) -> ProviderOutcome<SpamScanResult> {
        assert!(raw_email.contains("Subject: Email Audit Test - "));
        match self.score {
            Some(score) => ProviderOutcome::Ok(SpamScanResult::scored(score, Vec::new())),
            None => transport_error("timed out"),
        }
    }
}

/// Scraper that either fails with an exit code or returns one real file.
pub struct MockScraper {
    pub exit_code: Option<i32>,
    pub shot: Option<PathBuf>,
    pub captures: AtomicU32,
    pub cleanups: AtomicU32,
}

impl MockScraper {
    pub fn failing(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            shot: None,
            captures: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
        }
    }

    pub fn with_shot(path: PathBuf) -> Self {
        Self {
            exit_code: None,
            shot: Some(path),
            captures: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn capture(&self, domain: &str) -> mailaudit_scraper::Result<Capture> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.exit_code {
            return Err(ScraperError::Exited {
                code: Some(code),
                class: ExitClass::from_code(Some(code)),
            });
        }
        Ok(Capture {
            domain: domain.to_string(),
            dir: PathBuf::from("unused"),
            screenshots: self
                .shot
                .iter()
                .map(|path| Screenshot {
                    dashboard: Dashboard::SpamRate,
                    path: path.clone(),
                })
                .collect(),
        })
    }

    async fn cleanup(&self, _domain: &str) -> mailaudit_scraper::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        polling: PollingConfig {
            idle_interval_secs: 30,
            post_dispatch_wait_secs: 1,
            sweep_interval_secs: 1,
            min_poll_interval_secs: 0,
            sweep_max_attempts: 3,
            sweep_max_duration_secs: 60,
        },
        sender_template: "audit@{domain}".into(),
        recipient: "test@example.com".into(),
    }
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub placement: Arc<MockPlacement>,
    pub scraper: Arc<MockScraper>,
    pub orchestrator: Orchestrator,
    pub audit_id: String,
}

pub async fn harness(
    domain: Option<&str>,
    blacklist: MockBlacklist,
    placement: MockPlacement,
    spam: MockSpam,
    scraper: MockScraper,
) -> Harness {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let domain_id = match domain {
        Some(name) => Some(store.insert_domain(name).await.unwrap()),
        None => None,
    };
    let audit_id = store
        .insert_audit("AUD-1", domain_id.as_deref(), AuditStatus::Running)
        .await
        .unwrap();

    let placement = Arc::new(placement);
    let scraper = Arc::new(scraper);
    let providers = Providers {
        blacklist: Arc::new(blacklist),
        placement: placement.clone(),
        spam: Arc::new(spam),
    };
    let orchestrator = Orchestrator::new(store.clone(), providers, scraper.clone(), settings());

    Harness {
        store,
        placement,
        scraper,
        orchestrator,
        audit_id,
    }
}
