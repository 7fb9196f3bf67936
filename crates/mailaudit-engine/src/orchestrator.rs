//! The audit orchestrator.
//!
//! Drives one record at a time through the audit state machine:
//!
//! ```text
//! Running ─► Test Created ─► Awaiting Email Sending ─(operator)─► Emails Sent
//!    │                                                                │
//!    └──(placement test failed)──► GlockApps Completed ◄─(poll/stable)┘
//!                                        │
//!                                        ▼
//!                               Postmark Completed ─► Completed
//! ```
//!
//! DNS failure sends a record to `Error`, a failed placement poll to
//! `Report Error`. Every other provider failure is replaced by flagged
//! fallback values so the audit keeps moving.

use crate::error::Result;
use crate::fields;
use crate::sweep::{SweepReport, Transition};
use crate::tracking::PlacementTracker;
use chrono::Utc;
use mailaudit_core::config::PollingConfig;
use mailaudit_core::{
    is_fallback_test_id, AppConfig, AuditField, AuditStatus, BlacklistResults, Block, FieldMap,
    PlacementStats, Record, SpamScanResult,
};
use mailaudit_providers::{
    audit_email, BlacklistProvider, PlacementProvider, ProviderOutcome, SpamScanner,
};
use mailaudit_report::{
    final_report, initial_report, missing_screenshots_note, screenshots_heading, ReportMetrics,
};
use mailaudit_scraper::{Capture, Scraper};
use mailaudit_store::{mime_for, RecordStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The three deliverability providers an audit calls.
#[derive(Clone)]
pub struct Providers {
    /// DNS resolution and blacklist lookups
    pub blacklist: Arc<dyn BlacklistProvider>,
    /// Seed-list placement tests
    pub placement: Arc<dyn PlacementProvider>,
    /// Content spam scoring
    pub spam: Arc<dyn SpamScanner>,
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Loop cadence
    pub polling: PollingConfig,
    /// Sender of the scanned message; `{domain}` is replaced by the audited domain
    pub sender_template: String,
    /// Recipient of the scanned message
    pub recipient: String,
}

impl EngineSettings {
    /// Settings from the application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            polling: config.polling.clone(),
            sender_template: config.spam_scan.from_template.clone(),
            recipient: config.spam_scan.to_address.clone(),
        }
    }

    fn sender_for(&self, domain: &str) -> String {
        self.sender_template.replace("{domain}", domain)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Result of the start-up connection checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Placement provider reachable with the configured credentials
    pub placement: bool,
    /// Spam scanner reachable
    pub spam_scan: bool,
}

/// How far a dispatch got before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DispatchStage {
    Started,
    Resolved,
    BlacklistWritten,
    /// A placement test exists at the provider
    TestCreated { test_id: String },
}

/// Drives audit records through the state machine.
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    providers: Providers,
    scraper: Arc<dyn Scraper>,
    settings: EngineSettings,
    tracker: PlacementTracker,
    /// `Running` records skipped by dispatch because their placement test
    /// was created but could not be recorded
    held: Mutex<HashSet<String>>,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        store: Arc<dyn RecordStore>,
        providers: Providers,
        scraper: Arc<dyn Scraper>,
        settings: EngineSettings,
    ) -> Self {
        let tracker = PlacementTracker::new(settings.polling.min_poll_interval());
        Self {
            store,
            providers,
            scraper,
            settings,
            tracker,
            held: Mutex::new(HashSet::new()),
        }
    }

    /// Poll bookkeeping, exposed for inspection.
    #[must_use]
    pub fn tracker(&self) -> &PlacementTracker {
        &self.tracker
    }

    /// Check the placement and spam scan providers. Failures are logged and
    /// never stop the loop from starting.
    pub async fn check_connections(&self) -> ConnectionReport {
        let placement = self.providers.placement.check_connection().await;
        if placement {
            info!("Placement provider connection OK");
        } else {
            warn!("Placement provider connection check failed");
        }
        let spam_scan = self.providers.spam.check_connection().await;
        if spam_scan {
            info!("Spam scan provider connection OK");
        } else {
            warn!("Spam scan provider connection check failed");
        }
        ConnectionReport {
            placement,
            spam_scan,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            idle_secs = self.settings.polling.idle_interval_secs,
            sweep_secs = self.settings.polling.sweep_interval_secs,
            "Audit orchestrator starting"
        );
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let pause = self.run_iteration(&shutdown).await;
            if !sleep_unless_cancelled(pause, &shutdown).await {
                break;
            }
        }
        info!("Audit orchestrator stopped");
    }

    /// One loop iteration. Returns how long to wait before the next one.
    pub async fn run_iteration(&mut self, shutdown: &CancellationToken) -> Duration {
        let polling = self.settings.polling.clone();

        match self.dispatch_next().await {
            Ok(true) => {
                if sleep_unless_cancelled(polling.post_dispatch_wait(), shutdown).await {
                    self.sweep_until_settled(shutdown).await;
                }
                return Duration::ZERO;
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "Failed to dispatch running audits");
                return polling.idle_interval();
            }
        }

        match self.has_in_progress().await {
            Ok(true) => {
                if let Err(e) = self.sweep().await {
                    error!(error = %e, "Sweep failed");
                }
                polling.sweep_interval()
            }
            Ok(false) => {
                debug!("No audits in progress");
                polling.idle_interval()
            }
            Err(e) => {
                error!(error = %e, "Failed to query in-progress audits");
                polling.idle_interval()
            }
        }
    }

    /// Repeat sweeps after a dispatch until something settles or the
    /// attempt and time budget runs out.
    async fn sweep_until_settled(&mut self, shutdown: &CancellationToken) {
        let polling = self.settings.polling.clone();
        let started = Instant::now();

        for attempt in 1..=polling.sweep_max_attempts {
            if shutdown.is_cancelled() {
                return;
            }
            debug!(attempt, "Post-dispatch sweep");
            let report = match self.sweep().await {
                Ok(report) => report,
                Err(e) => {
                    warn!(attempt, error = %e, "Sweep failed");
                    SweepReport::default()
                }
            };
            if report.reached_completed() || report.reached_failure() {
                break;
            }
            if matches!(self.has_in_progress().await, Ok(false)) {
                break;
            }
            if started.elapsed() >= polling.sweep_max_duration() {
                info!(attempt, "Sweep budget exhausted");
                break;
            }
            if attempt < polling.sweep_max_attempts
                && !sleep_unless_cancelled(polling.sweep_interval(), shutdown).await
            {
                return;
            }
        }
    }

    async fn has_in_progress(&self) -> Result<bool> {
        for status in AuditStatus::IN_PROGRESS {
            if !self.store.query_by_status(status).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Take the oldest `Running` record through the blacklist and test
    /// creation steps. Returns whether a record was dispatched.
    pub async fn dispatch_next(&self) -> Result<bool> {
        let running = self.store.query_by_status(AuditStatus::Running).await?;
        let held = self.held.lock().await;
        let Some(mut record) = running.into_iter().find(|r| !held.contains(&r.id)) else {
            return Ok(false);
        };
        drop(held);

        info!(record_id = %record.id, audit = %record.title, "Dispatching audit");
        let mut stage = DispatchStage::Started;
        if let Err(e) = self.start_audit(&mut record, &mut stage).await {
            error!(record_id = %record.id, ?stage, error = %e, "Audit start failed");
            if let DispatchStage::TestCreated { test_id } = &stage {
                error!(
                    record_id = %record.id,
                    %test_id,
                    "Placement test was created but not recorded; holding the record \
                     until restart instead of creating another test"
                );
                self.held.lock().await.insert(record.id.clone());
            }
        }
        Ok(true)
    }

    /// Number of `Running` records held back from dispatch.
    pub async fn held_count(&self) -> usize {
        self.held.lock().await.len()
    }

    async fn start_audit(&self, record: &mut Record, stage: &mut DispatchStage) -> Result<()> {
        let Some(domain) = self.domain_of(record).await? else {
            warn!(record_id = %record.id, "Audit has no domain");
            self.apply(record, fields::missing_domain_fields()).await?;
            return Ok(());
        };

        let blacklist = &self.providers.blacklist;
        let ip = match blacklist.resolve(&domain).await {
            ProviderOutcome::Ok(ip) => ip,
            failure => {
                let message = failure.failure_message().unwrap_or_default();
                error!(record_id = %record.id, %domain, error = %message, "Domain did not resolve");
                self.apply(record, fields::dns_failure_fields(&domain, &message))
                    .await?;
                return Ok(());
            }
        };
        info!(record_id = %record.id, %domain, %ip, "Resolved sending IP");
        *stage = DispatchStage::Resolved;

        let ip_lookup = blacklist.check(&ip.to_string()).await;
        let domain_lookup = blacklist.check(&domain).await;
        for (item, outcome) in [("ip", &ip_lookup), ("domain", &domain_lookup)] {
            if let Some(message) = outcome.failure_message() {
                warn!(record_id = %record.id, item, error = %message, "Blacklist lookup failed, using fallback");
            }
        }
        let results = BlacklistResults {
            ip: ip_lookup.ok(),
            domain: domain_lookup.ok(),
        };
        self.apply(record, fields::blacklist_fields(&results)).await?;
        *stage = DispatchStage::BlacklistWritten;

        match self.providers.placement.create_test(&domain).await {
            ProviderOutcome::Ok(test) => {
                info!(
                    record_id = %record.id,
                    test_id = %test.test_id,
                    seeds = test.seed_addresses.len(),
                    "Placement test created"
                );
                *stage = DispatchStage::TestCreated {
                    test_id: test.test_id.clone(),
                };
                self.apply(record, fields::test_created_fields(&test)).await?;
                self.apply(record, fields::awaiting_send_fields()).await?;
            }
            failure => {
                let message = failure.failure_message().unwrap_or_default();
                warn!(record_id = %record.id, error = %message, "Placement test creation failed, using fallback");
                let fields = fields::placement_fallback_fields(&message, Utc::now().timestamp());
                self.apply(record, fields).await?;
            }
        }
        Ok(())
    }

    /// One pass over the parked records: every `Emails Sent` record, then
    /// the first `GlockApps Completed` and the first `Postmark Completed`.
    pub async fn sweep(&mut self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for mut record in self.store.query_by_status(AuditStatus::EmailsSent).await? {
            match self.advance_sent(&mut record).await {
                Ok(Some(t)) => report.push(t),
                Ok(None) => {}
                Err(e) => error!(record_id = %record.id, error = %e, "Placement step failed"),
            }
        }

        if let Some(mut record) = self
            .store
            .query_by_status(AuditStatus::GlockAppsCompleted)
            .await?
            .into_iter()
            .next()
        {
            match self.scan_content(&mut record).await {
                Ok(Some(t)) => report.push(t),
                Ok(None) => {}
                Err(e) => error!(record_id = %record.id, error = %e, "Spam scan step failed"),
            }
        }

        if let Some(mut record) = self
            .store
            .query_by_status(AuditStatus::PostmarkCompleted)
            .await?
            .into_iter()
            .next()
        {
            match self.finish_audit(&mut record).await {
                Ok(Some(t)) => report.push(t),
                Ok(None) => {}
                Err(e) => error!(record_id = %record.id, error = %e, "Final step failed"),
            }
        }

        debug!(transitions = report.transitions.len(), "Sweep done");
        Ok(report)
    }

    async fn advance_sent(&mut self, record: &mut Record) -> Result<Option<Transition>> {
        let Some(test_id) = record.text(AuditField::TestId).map(str::to_string) else {
            warn!(record_id = %record.id, "Emails sent but no placement test id, leaving parked");
            return Ok(None);
        };

        if is_fallback_test_id(&test_id) {
            info!(record_id = %record.id, %test_id, "Fallback test id, skipping placement poll");
            return self.apply(record, fields::fallback_sent_fields()).await;
        }

        if !self.tracker.try_begin_poll(&test_id) {
            debug!(record_id = %record.id, %test_id, "Poll throttled");
            return Ok(None);
        }

        match self.providers.placement.poll_test(&test_id).await {
            ProviderOutcome::Ok(placement) => {
                let observation = self.tracker.observe(&test_id, &placement);
                if !observation.is_complete() {
                    info!(
                        record_id = %record.id,
                        %test_id,
                        history = ?self.tracker.history(&test_id),
                        "Placement test not ready"
                    );
                    return Ok(None);
                }
                info!(record_id = %record.id, %test_id, ?observation, "Placement test complete");
                self.tracker.forget(&test_id);
                let transition = self
                    .apply(record, fields::placement_completed_fields(&placement))
                    .await?;
                if transition.is_some() {
                    let blocks = initial_report(&ReportMetrics::from_record(record));
                    self.write_report(record, &blocks).await;
                }
                Ok(transition)
            }
            failure => {
                let message = failure.failure_message().unwrap_or_default();
                error!(record_id = %record.id, %test_id, error = %message, "Placement poll failed");
                self.tracker.forget(&test_id);
                self.apply(record, fields::poll_failure_fields(&test_id, &message))
                    .await
            }
        }
    }

    async fn scan_content(&self, record: &mut Record) -> Result<Option<Transition>> {
        let domain = self
            .domain_of(record)
            .await?
            .unwrap_or_else(|| record.title.clone());
        let number = |field| record.number(field).unwrap_or(0.0);
        let stats = PlacementStats {
            inbox_rate: number(AuditField::InboxPlacement),
            spam_rate: number(AuditField::SpamPlacement),
            other_rate: number(AuditField::PromotionsPlacement),
            not_delivered_rate: number(AuditField::NotDeliveredRate),
        };
        let email = audit_email(
            &domain,
            &self.settings.sender_for(&domain),
            &self.settings.recipient,
            &stats,
        );

        let result = match self.providers.spam.scan(&email).await {
            ProviderOutcome::Ok(result) => {
                info!(record_id = %record.id, score = result.score, band = %result.band, "Content scanned");
                result
            }
            failure => {
                warn!(
                    record_id = %record.id,
                    error = %failure.failure_message().unwrap_or_default(),
                    "Spam scan failed, using fallback"
                );
                SpamScanResult::fallback()
            }
        };
        self.apply(record, fields::spam_scan_fields(&result)).await
    }

    async fn finish_audit(&self, record: &mut Record) -> Result<Option<Transition>> {
        let Some(domain) = self.domain_of(record).await? else {
            warn!(record_id = %record.id, "No domain for dashboard capture");
            let title = record.title.clone();
            return self.finish_without_screenshots(record, &title).await;
        };

        match self.scraper.capture(&domain).await {
            Ok(capture) => self.finish_with_capture(record, capture).await,
            Err(e) => {
                error!(record_id = %record.id, %domain, error = %e, "Dashboard capture failed");
                self.finish_without_screenshots(record, &domain).await
            }
        }
    }

    async fn finish_with_capture(
        &self,
        record: &mut Record,
        capture: Capture,
    ) -> Result<Option<Transition>> {
        let blocks = final_report(&ReportMetrics::from_record(record));
        self.write_report(record, &blocks).await;

        if capture.screenshots.is_empty() {
            info!(record_id = %record.id, domain = %capture.domain, "No screenshots to attach");
            self.cleanup_capture(&capture.domain).await;
            return self.apply(record, fields::completed_fields(None)).await;
        }

        let mut files = Vec::with_capacity(capture.screenshots.len());
        let mut captions = Vec::with_capacity(capture.screenshots.len());
        for shot in &capture.screenshots {
            match self
                .store
                .upload_file(&shot.path, &mime_for(&shot.path))
                .await
            {
                Ok(file) => {
                    files.push(file);
                    captions.push(shot.caption().to_string());
                }
                Err(e) => {
                    error!(
                        record_id = %record.id,
                        path = %shot.path.display(),
                        error = %e,
                        "Screenshot upload failed, keeping local copies"
                    );
                    return self.apply(record, fields::completed_fields(None)).await;
                }
            }
        }

        let attached = match self
            .store
            .append_content_blocks(&record.id, &[screenshots_heading()])
            .await
        {
            Ok(()) => {
                self.store
                    .append_image_blocks(&record.id, &files, &captions)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = attached {
            error!(record_id = %record.id, error = %e, "Failed to attach screenshots, keeping local copies");
            return self.apply(record, fields::completed_fields(None)).await;
        }

        info!(record_id = %record.id, count = files.len(), "Screenshots attached");
        self.cleanup_capture(&capture.domain).await;
        self.apply(record, fields::completed_fields(Some(Utc::now())))
            .await
    }

    async fn finish_without_screenshots(
        &self,
        record: &mut Record,
        domain: &str,
    ) -> Result<Option<Transition>> {
        let mut blocks = final_report(&ReportMetrics::from_record(record));
        blocks.push(missing_screenshots_note());
        self.write_report(record, &blocks).await;
        self.apply(record, fields::scraper_failure_fields(domain))
            .await
    }

    async fn cleanup_capture(&self, domain: &str) {
        if let Err(e) = self.scraper.cleanup(domain).await {
            warn!(%domain, error = %e, "Failed to remove screenshot directory");
        }
    }

    /// Replace the report body. Failures are logged; the record still moves on.
    async fn write_report(&self, record: &Record, blocks: &[Block]) {
        match self.store.replace_content_blocks(&record.id, blocks).await {
            Ok(()) => debug!(record_id = %record.id, blocks = blocks.len(), "Report written"),
            Err(e) => error!(record_id = %record.id, error = %e, "Failed to write report"),
        }
    }

    async fn domain_of(&self, record: &Record) -> Result<Option<String>> {
        let Some(relation) = record.domain_relation.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .store
            .related_name(relation)
            .await?
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()))
    }

    /// Write `fields` and mirror them into `record`. A status change that
    /// would move the record backwards is refused and nothing is written.
    async fn apply(&self, record: &mut Record, fields: FieldMap) -> Result<Option<Transition>> {
        let target = fields
            .get(&AuditField::Status)
            .and_then(|v| v.as_str())
            .map(str::parse::<AuditStatus>)
            .transpose()?;
        let current = record.status();

        if let (Some(from), Some(to)) = (current, target) {
            if let Err(e) = from.advance_to(to) {
                warn!(record_id = %record.id, error = %e, "Refusing status change");
                return Ok(None);
            }
        }

        self.store.update_fields(&record.id, &fields).await?;
        record.fields.extend(fields);

        Ok(match (current, target) {
            (Some(from), Some(to)) if from != to => {
                info!(record_id = %record.id, %from, %to, "Status changed");
                Some(Transition {
                    record_id: record.id.clone(),
                    from,
                    to,
                })
            }
            _ => None,
        })
    }
}

/// Sleep for `duration`; returns `false` if cancelled first.
async fn sleep_unless_cancelled(duration: Duration, shutdown: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !shutdown.is_cancelled();
    }
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}
