//! End-to-end runs of the orchestrator against an in-memory store.

mod common;

use async_trait::async_trait;
use common::{
    harness, placement, transport_error, MockBlacklist, MockPlacement, MockScraper, MockSpam,
};
use mailaudit_core::{
    AuditField, AuditStatus, Block, FieldMap, FieldValue, FileHandle, Record, SeedChunks,
};
use mailaudit_engine::{Orchestrator, Providers};
use mailaudit_store::{RecordStore, SqliteStore, StoreError};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn status_of(store: &SqliteStore, id: &str) -> Option<AuditStatus> {
    store.get_record(id).await.unwrap().unwrap().status()
}

async fn text_of(store: &SqliteStore, id: &str, field: AuditField) -> Option<String> {
    store
        .get_record(id)
        .await
        .unwrap()
        .unwrap()
        .text(field)
        .map(str::to_string)
}

async fn mark_emails_sent(store: &SqliteStore, id: &str) {
    let mut fields = FieldMap::new();
    fields.insert(
        AuditField::Status,
        FieldValue::Select(AuditStatus::EmailsSent.label().to_string()),
    );
    store.update_fields(id, &fields).await.unwrap();
}

fn has_text(blocks: &[Block], needle: &str) -> bool {
    blocks
        .iter()
        .filter_map(Block::text)
        .any(|t| t.contains(needle))
}

fn image_count(blocks: &[Block]) -> usize {
    blocks
        .iter()
        .filter(|b| matches!(b, Block::Image { .. }))
        .count()
}

#[tokio::test]
async fn test_dispatch_creates_test_and_waits_for_operator() {
    let h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::default(),
        MockSpam { score: Some(2.0) },
        MockScraper::failing(1),
    )
    .await;

    assert!(h.orchestrator.dispatch_next().await.unwrap());
    assert_eq!(
        status_of(&h.store, &h.audit_id).await,
        Some(AuditStatus::AwaitingEmailSending)
    );
    assert_eq!(
        text_of(&h.store, &h.audit_id, AuditField::TestId).await.as_deref(),
        Some("test-42")
    );
    assert_eq!(
        text_of(&h.store, &h.audit_id, AuditField::IpBlacklistStatus)
            .await
            .as_deref(),
        Some("Detections: 0")
    );
    // 40 seeds: two groups used, three sentinels
    assert_eq!(
        text_of(&h.store, &h.audit_id, AuditField::SeedList3)
            .await
            .as_deref(),
        Some(SeedChunks::UNAVAILABLE)
    );

    // Nothing left in Running
    assert!(!h.orchestrator.dispatch_next().await.unwrap());
}

#[tokio::test]
async fn test_placement_failure_falls_back_to_completed() {
    let dir = tempfile::tempdir().unwrap();
    let shot = dir.path().join("spam_rate.png");
    std::fs::write(&shot, b"\x89PNG").unwrap();

    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::failing(),
        MockSpam { score: Some(7.5) },
        MockScraper::with_shot(shot),
    )
    .await;

    assert!(h.orchestrator.dispatch_next().await.unwrap());
    assert_eq!(
        status_of(&h.store, &h.audit_id).await,
        Some(AuditStatus::GlockAppsCompleted)
    );
    let test_id = text_of(&h.store, &h.audit_id, AuditField::TestId)
        .await
        .unwrap();
    assert!(test_id.starts_with("fallback_"));
    assert!(text_of(&h.store, &h.audit_id, AuditField::ErrorLog)
        .await
        .unwrap()
        .starts_with("GlockApps Error: HTTP 500"));

    let report = h.orchestrator.sweep().await.unwrap();
    assert!(report.reached_completed());
    assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::Completed));

    let record = h.store.get_record(&h.audit_id).await.unwrap().unwrap();
    assert_eq!(record.number(AuditField::ContentSpamScore), Some(7.5));
    assert_eq!(record.text(AuditField::ContentDeliverability), Some("Good"));
    assert!(record.text(AuditField::ScreenshotsCapturedAt).is_some());

    let blocks = h.store.content_blocks(&h.audit_id).await.unwrap();
    assert!(has_text(&blocks, "⚠️ NOTE: GlockApps testing failed"));
    assert!(has_text(&blocks, "Google Postmaster Screenshots"));
    assert_eq!(image_count(&blocks), 1);
    assert_eq!(h.store.upload_count().await.unwrap(), 1);
    assert_eq!(h.scraper.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scraper_failure_still_completes() {
    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::with_polls(vec![common::ok(placement(true, 0))]),
        MockSpam { score: None },
        MockScraper::failing(1),
    )
    .await;

    h.orchestrator.dispatch_next().await.unwrap();
    mark_emails_sent(&h.store, &h.audit_id).await;

    let report = h.orchestrator.sweep().await.unwrap();
    assert!(report.reached_completed());
    assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::Completed));

    let record = h.store.get_record(&h.audit_id).await.unwrap().unwrap();
    assert_eq!(record.number(AuditField::InboxPlacement), Some(90.0));
    assert_eq!(
        record.text(AuditField::ContentDeliverability),
        Some("Unknown (API Failed)")
    );
    // Overwritten by the scraper step, not appended to the spam scan note
    assert_eq!(
        record.text(AuditField::ErrorLog),
        Some(
            "Postmaster scraper failed for domain example.com. Screenshots unavailable. \
             Check logs for details."
        )
    );
    assert!(record.text(AuditField::ScreenshotsCapturedAt).is_none());

    let blocks = h.store.content_blocks(&h.audit_id).await.unwrap();
    assert_eq!(image_count(&blocks), 0);
    assert!(has_text(&blocks, "Content Spam Score"));
    assert!(has_text(&blocks, "screenshots could not be captured"));
    assert_eq!(h.scraper.captures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stable_not_delivered_count_completes() {
    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::with_polls(vec![
            common::ok(placement(false, 5)),
            common::ok(placement(false, 5)),
            common::ok(placement(false, 5)),
        ]),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    h.orchestrator.dispatch_next().await.unwrap();
    mark_emails_sent(&h.store, &h.audit_id).await;

    for _ in 0..2 {
        let report = h.orchestrator.sweep().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::EmailsSent));
    }
    assert_eq!(h.orchestrator.tracker().history("test-42"), vec![5, 5]);

    let report = h.orchestrator.sweep().await.unwrap();
    assert_eq!(report.transitions[0].to, AuditStatus::GlockAppsCompleted);
    assert_eq!(h.placement.polls(), 3);
    assert!(text_of(&h.store, &h.audit_id, AuditField::IssuesFound)
        .await
        .unwrap()
        .contains("Test not yet completed"));
}

#[tokio::test]
async fn test_moving_not_delivered_count_keeps_waiting() {
    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::with_polls(vec![
            common::ok(placement(false, 5)),
            common::ok(placement(false, 6)),
            common::ok(placement(false, 5)),
        ]),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    h.orchestrator.dispatch_next().await.unwrap();
    mark_emails_sent(&h.store, &h.audit_id).await;

    for _ in 0..3 {
        assert!(h.orchestrator.sweep().await.unwrap().is_empty());
    }
    assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::EmailsSent));
    assert_eq!(h.orchestrator.tracker().history("test-42"), vec![5, 6, 5]);
}

#[tokio::test]
async fn test_poll_failure_is_report_error() {
    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::with_polls(vec![transport_error("connection reset")]),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    h.orchestrator.dispatch_next().await.unwrap();
    mark_emails_sent(&h.store, &h.audit_id).await;

    let report = h.orchestrator.sweep().await.unwrap();
    assert!(report.reached_failure());
    assert_eq!(
        status_of(&h.store, &h.audit_id).await,
        Some(AuditStatus::ReportError)
    );
    assert!(text_of(&h.store, &h.audit_id, AuditField::ErrorLog)
        .await
        .unwrap()
        .contains("connection reset"));
}

#[tokio::test]
async fn test_unresolvable_domain_is_error() {
    let h = harness(
        Some("nonexistent.invalid"),
        MockBlacklist::unresolvable(),
        MockPlacement::default(),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    assert!(h.orchestrator.dispatch_next().await.unwrap());
    assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::Error));
    assert_eq!(h.placement.creates(), 0);
    assert!(text_of(&h.store, &h.audit_id, AuditField::ErrorLog)
        .await
        .unwrap()
        .contains("nonexistent.invalid"));
}

#[tokio::test]
async fn test_missing_domain_is_error() {
    let h = harness(
        None,
        MockBlacklist::clean(),
        MockPlacement::default(),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    assert!(h.orchestrator.dispatch_next().await.unwrap());
    assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::Error));
    assert_eq!(h.placement.creates(), 0);
}

#[tokio::test]
async fn test_fallback_test_id_skips_polling() {
    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::failing(),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    h.orchestrator.dispatch_next().await.unwrap();
    // Operator flipped the fallback record back to Emails Sent by hand
    mark_emails_sent(&h.store, &h.audit_id).await;

    let report = h.orchestrator.sweep().await.unwrap();
    assert_eq!(report.transitions[0].to, AuditStatus::GlockAppsCompleted);
    assert_eq!(h.placement.polls(), 0);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let mut h = harness(
        Some("example.com"),
        MockBlacklist::clean(),
        MockPlacement::failing(),
        MockSpam { score: Some(1.0) },
        MockScraper::failing(1),
    )
    .await;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let store = h.store.clone();
    let audit_id = h.audit_id.clone();
    tokio::spawn(async move {
        loop {
            if status_of(&store, &audit_id).await == Some(AuditStatus::Completed) {
                trigger.cancel();
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    tokio::time::timeout(Duration::from_secs(20), h.orchestrator.run(shutdown))
        .await
        .expect("run loop did not stop after cancellation");
    assert_eq!(status_of(&h.store, &h.audit_id).await, Some(AuditStatus::Completed));
}

/// Delegates to SQLite but refuses to record the `Test Created` status.
struct RejectTestCreated(Arc<SqliteStore>);

#[async_trait]
impl RecordStore for RejectTestCreated {
    async fn query_by_status(&self, status: AuditStatus) -> mailaudit_store::Result<Vec<Record>> {
        self.0.query_by_status(status).await
    }

    async fn get_record(&self, record_id: &str) -> mailaudit_store::Result<Option<Record>> {
        self.0.get_record(record_id).await
    }

    async fn update_fields(&self, record_id: &str, fields: &FieldMap) -> mailaudit_store::Result<()> {
        let created = FieldValue::Select(AuditStatus::TestCreated.label().to_string());
        if fields.get(&AuditField::Status) == Some(&created) {
            return Err(StoreError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        self.0.update_fields(record_id, fields).await
    }

    async fn related_name(&self, relation_id: &str) -> mailaudit_store::Result<Option<String>> {
        self.0.related_name(relation_id).await
    }

    async fn replace_content_blocks(
        &self,
        record_id: &str,
        blocks: &[Block],
    ) -> mailaudit_store::Result<()> {
        self.0.replace_content_blocks(record_id, blocks).await
    }

    async fn append_content_blocks(
        &self,
        record_id: &str,
        blocks: &[Block],
    ) -> mailaudit_store::Result<()> {
        self.0.append_content_blocks(record_id, blocks).await
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> mailaudit_store::Result<FileHandle> {
        self.0.upload_file(path, mime_type).await
    }
}

#[tokio::test]
async fn test_unrecorded_test_is_not_created_again() {
    let sqlite = Arc::new(SqliteStore::in_memory().await.unwrap());
    let domain_id = sqlite.insert_domain("example.com").await.unwrap();
    let audit_id = sqlite
        .insert_audit("AUD-1", Some(&domain_id), AuditStatus::Running)
        .await
        .unwrap();

    let placement = Arc::new(MockPlacement::default());
    let providers = Providers {
        blacklist: Arc::new(MockBlacklist::clean()),
        placement: placement.clone(),
        spam: Arc::new(MockSpam { score: Some(1.0) }),
    };
    let orchestrator = Orchestrator::new(
        Arc::new(RejectTestCreated(sqlite.clone())),
        providers,
        Arc::new(MockScraper::failing(1)),
        common::settings(),
    );

    assert!(orchestrator.dispatch_next().await.unwrap());
    assert_eq!(status_of(&sqlite, &audit_id).await, Some(AuditStatus::Running));
    assert_eq!(placement.creates(), 1);
    assert_eq!(orchestrator.held_count().await, 1);

    // Still Running, but held back instead of dispatched again
    assert!(!orchestrator.dispatch_next().await.unwrap());
    assert_eq!(placement.creates(), 1);
}
