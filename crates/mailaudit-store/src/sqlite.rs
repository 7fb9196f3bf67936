//! `SQLite` record store for offline runs and tests.
//!
//! Field values are stored as JSON-encoded [`FieldValue`]s keyed by column
//! name; the status lives in its own indexed column so status queries stay
//! cheap. Uploaded files are kept as blobs.

use crate::error::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::store::RecordStore;
use async_trait::async_trait;
use chrono::Utc;
use mailaudit_core::{AuditField, AuditStatus, Block, FieldMap, FieldValue, FileHandle, Record};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

/// Local record store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a store and apply migrations.
    ///
    /// `:memory:` opens a private in-memory database on a single connection.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| StoreError::Config("database path is not valid UTF-8".to_string()))?;
        let in_memory = path_str == ":memory:";

        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(|e| StoreError::Config(format!("invalid connection string: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        run_migrations(&pool).await?;

        tracing::info!("Local audit store opened at {}", path_str);
        Ok(Self { pool })
    }

    /// Open a private in-memory store.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(":memory:").await
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a domain entry and return its id.
    pub async fn insert_domain(&self, name: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO domains (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Insert an audit record in `status` and return its id.
    pub async fn insert_audit(
        &self,
        title: &str,
        domain_id: Option<&str>,
        status: AuditStatus,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO audits (id, title, domain_id, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(domain_id)
        .bind(status.label())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        tracing::debug!(audit_id = %id, %status, "Inserted audit");
        Ok(id)
    }

    /// Report body of a record, in order.
    pub async fn content_blocks(&self, record_id: &str) -> Result<Vec<Block>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT block FROM content_blocks WHERE audit_id = ? ORDER BY position, id",
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|raw| serde_json::from_str(raw).map_err(StoreError::from))
            .collect()
    }

    /// Number of stored uploads.
    pub async fn upload_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM uploads")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn load_record(&self, row: &SqliteRow) -> Result<Record> {
        let id: String = row.try_get("id")?;
        let mut record = Record::new(id.clone(), row.try_get::<String, _>("title")?);
        record.domain_relation = row.try_get("domain_id")?;
        if let Some(status) = row.try_get::<Option<String>, _>("status")? {
            record
                .fields
                .insert(AuditField::Status, FieldValue::Select(status));
        }

        let fields = sqlx::query("SELECT name, value FROM audit_fields WHERE audit_id = ?")
            .bind(&id)
            .fetch_all(&self.pool)
            .await?;
        for field_row in fields {
            let name: String = field_row.try_get("name")?;
            let Some(field) = AuditField::from_name(&name) else {
                tracing::debug!(audit_id = %id, field = %name, "Skipping unknown field");
                continue;
            };
            let raw: String = field_row.try_get("value")?;
            let value: FieldValue = serde_json::from_str(&raw)
                .map_err(|e| StoreError::Decode(format!("field {name} of {id}: {e}")))?;
            record.fields.insert(field, value);
        }
        Ok(record)
    }

    async fn next_position(&self, record_id: &str) -> Result<i64> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(position) FROM content_blocks WHERE audit_id = ?")
                .bind(record_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.map_or(0, |m| m + 1))
    }

    async fn ensure_exists(&self, record_id: &str) -> Result<()> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM audits WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        found
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("audit {record_id}")))
    }

    /// Insert `blocks` from position `start`, optionally clearing the
    /// existing body first. Both happen in one transaction.
    async fn write_blocks(
        &self,
        record_id: &str,
        start: i64,
        blocks: &[Block],
        clear: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if clear {
            sqlx::query("DELETE FROM content_blocks WHERE audit_id = ?")
                .bind(record_id)
                .execute(&mut *tx)
                .await?;
        }
        for (offset, block) in (start..).zip(blocks) {
            sqlx::query("INSERT INTO content_blocks (audit_id, position, block) VALUES (?, ?, ?)")
                .bind(record_id)
                .bind(offset)
                .bind(serde_json::to_string(block)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn query_by_status(&self, status: AuditStatus) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT id, title, domain_id, status FROM audits WHERE status = ? ORDER BY rowid",
        )
        .bind(status.label())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.load_record(row).await?);
        }
        Ok(records)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<Record>> {
        let row = sqlx::query("SELECT id, title, domain_id, status FROM audits WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.load_record(&row).await?)),
            None => Ok(None),
        }
    }

    async fn update_fields(&self, record_id: &str, fields: &FieldMap) -> Result<()> {
        self.ensure_exists(record_id).await?;

        let mut tx = self.pool.begin().await?;
        for (field, value) in fields {
            if *field == AuditField::Status {
                sqlx::query("UPDATE audits SET status = ? WHERE id = ?")
                    .bind(value.as_str().unwrap_or_default())
                    .bind(record_id)
                    .execute(&mut *tx)
                    .await?;
                continue;
            }
            sqlx::query(
                "INSERT INTO audit_fields (audit_id, name, value) VALUES (?, ?, ?)
                 ON CONFLICT(audit_id, name) DO UPDATE SET value = excluded.value",
            )
            .bind(record_id)
            .bind(field.name())
            .bind(serde_json::to_string(value)?)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE audits SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(record_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn related_name(&self, relation_id: &str) -> Result<Option<String>> {
        Ok(sqlx::query_scalar("SELECT name FROM domains WHERE id = ?")
            .bind(relation_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn replace_content_blocks(&self, record_id: &str, blocks: &[Block]) -> Result<()> {
        self.ensure_exists(record_id).await?;
        self.write_blocks(record_id, 0, blocks, true).await
    }

    async fn append_content_blocks(&self, record_id: &str, blocks: &[Block]) -> Result<()> {
        self.ensure_exists(record_id).await?;
        let start = self.next_position(record_id).await?;
        self.write_blocks(record_id, start, blocks, false).await
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO uploads (id, filename, content_type, data, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&filename)
        .bind(mime_type)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(FileHandle { id, filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (SqliteStore, String) {
        let store = SqliteStore::in_memory().await.expect("open store");
        let domain = store.insert_domain("example.com").await.expect("domain");
        let audit = store
            .insert_audit("AUD-1", Some(&domain), AuditStatus::Running)
            .await
            .expect("audit");
        (store, audit)
    }

    #[tokio::test]
    async fn test_query_by_status() {
        let (store, audit) = setup().await;
        store
            .insert_audit("AUD-2", None, AuditStatus::Completed)
            .await
            .expect("second audit");

        let running = store
            .query_by_status(AuditStatus::Running)
            .await
            .expect("query");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, audit);
        assert_eq!(running[0].title, "AUD-1");
        assert_eq!(running[0].status(), Some(AuditStatus::Running));
    }

    #[tokio::test]
    async fn test_update_fields_moves_status() {
        let (store, audit) = setup().await;
        let mut fields = FieldMap::new();
        fields.insert(
            AuditField::Status,
            FieldValue::Select(AuditStatus::TestCreated.label().to_string()),
        );
        fields.insert(AuditField::TestId, FieldValue::Text("t-1".into()));
        store.update_fields(&audit, &fields).await.expect("update");

        assert!(store
            .query_by_status(AuditStatus::Running)
            .await
            .unwrap()
            .is_empty());
        let record = store.get_record(&audit).await.unwrap().expect("record");
        assert_eq!(record.status(), Some(AuditStatus::TestCreated));
        assert_eq!(record.text(AuditField::TestId), Some("t-1"));
    }

    #[tokio::test]
    async fn test_update_fields_idempotent_and_overwrites() {
        let (store, audit) = setup().await;
        let mut fields = FieldMap::new();
        fields.insert(AuditField::ErrorLog, FieldValue::Text("first".into()));
        store.update_fields(&audit, &fields).await.unwrap();
        store.update_fields(&audit, &fields).await.unwrap();
        let once = store.get_record(&audit).await.unwrap().unwrap();

        fields.insert(AuditField::ErrorLog, FieldValue::Text("second".into()));
        store.update_fields(&audit, &fields).await.unwrap();
        let record = store.get_record(&audit).await.unwrap().unwrap();

        assert_eq!(once.text(AuditField::ErrorLog), Some("first"));
        assert_eq!(record.text(AuditField::ErrorLog), Some("second"));
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let (store, _) = setup().await;
        let err = store
            .update_fields("missing", &FieldMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_related_name() {
        let (store, audit) = setup().await;
        let record = store.get_record(&audit).await.unwrap().unwrap();
        let relation = record.domain_relation.expect("relation");
        assert_eq!(
            store.related_name(&relation).await.unwrap().as_deref(),
            Some("example.com")
        );
        assert_eq!(store.related_name("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_then_append_blocks() {
        let (store, audit) = setup().await;
        store
            .append_content_blocks(&audit, &[Block::paragraph("stale")])
            .await
            .unwrap();
        store
            .replace_content_blocks(&audit, &[Block::h1("Report"), Block::Divider])
            .await
            .unwrap();
        store
            .append_content_blocks(&audit, &[Block::paragraph("tail")])
            .await
            .unwrap();

        let blocks = store.content_blocks(&audit).await.unwrap();
        assert_eq!(
            blocks,
            vec![Block::h1("Report"), Block::Divider, Block::paragraph("tail")]
        );
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_body() {
        let (store, audit) = setup().await;
        store
            .replace_content_blocks(&audit, &[Block::h1("Initial Report")])
            .await
            .unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_block BEFORE INSERT ON content_blocks
             WHEN NEW.block LIKE '%unwritable%'
             BEGIN SELECT RAISE(ABORT, 'block rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let result = store
            .replace_content_blocks(
                &audit,
                &[Block::h1("Final Report"), Block::paragraph("unwritable")],
            )
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(
            store.content_blocks(&audit).await.unwrap(),
            vec![Block::h1("Initial Report")]
        );
    }

    #[tokio::test]
    async fn test_upload_and_image_blocks() {
        let (store, audit) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spam_rate.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let handle = store.upload_file(&path, "image/png").await.unwrap();
        assert_eq!(handle.filename, "spam_rate.png");
        assert_eq!(store.upload_count().await.unwrap(), 1);

        store
            .append_image_blocks(&audit, &[handle.clone()], &["Spam Rate".to_string()])
            .await
            .unwrap();
        let blocks = store.content_blocks(&audit).await.unwrap();
        assert_eq!(
            blocks,
            vec![Block::Image {
                file: handle,
                caption: "Spam Rate".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audits.db");
        let audit = {
            let store = SqliteStore::connect(&path).await.unwrap();
            store
                .insert_audit("AUD-9", None, AuditStatus::EmailsSent)
                .await
                .unwrap()
        };
        let store = SqliteStore::connect(&path).await.unwrap();
        let record = store.get_record(&audit).await.unwrap().unwrap();
        assert_eq!(record.status(), Some(AuditStatus::EmailsSent));
    }
}
