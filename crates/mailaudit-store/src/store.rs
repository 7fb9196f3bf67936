//! The record store interface consumed by the orchestrator.

use crate::error::Result;
use async_trait::async_trait;
use mailaudit_core::{AuditStatus, Block, FieldMap, FileHandle, Record};
use std::path::Path;

/// Storage for audit records and their report pages.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records currently in `status`, oldest first.
    async fn query_by_status(&self, status: AuditStatus) -> Result<Vec<Record>>;

    /// Fetch one record.
    async fn get_record(&self, record_id: &str) -> Result<Option<Record>>;

    /// Write a set of fields in one update. Fields not in the map are left
    /// untouched; writing the same map twice leaves the same state.
    async fn update_fields(&self, record_id: &str, fields: &FieldMap) -> Result<()>;

    /// Display name of a related entry (the audited domain).
    async fn related_name(&self, relation_id: &str) -> Result<Option<String>>;

    /// Replace the record's report body.
    async fn replace_content_blocks(&self, record_id: &str, blocks: &[Block]) -> Result<()>;

    /// Append blocks to the record's report body.
    async fn append_content_blocks(&self, record_id: &str, blocks: &[Block]) -> Result<()>;

    /// Upload a local file so it can be referenced from image blocks.
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle>;

    /// Append one captioned image block per uploaded file.
    async fn append_image_blocks(
        &self,
        record_id: &str,
        files: &[FileHandle],
        captions: &[String],
    ) -> Result<()> {
        let blocks: Vec<Block> = files
            .iter()
            .enumerate()
            .map(|(i, file)| Block::Image {
                file: file.clone(),
                caption: captions.get(i).cloned().unwrap_or_default(),
            })
            .collect();
        if blocks.is_empty() {
            return Ok(());
        }
        self.append_content_blocks(record_id, &blocks).await
    }
}

/// Guess a MIME type from a file name.
#[must_use]
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("spam_rate.png")), "image/png");
        assert_eq!(mime_for(Path::new("latest.json")), "application/json");
        assert_eq!(mime_for(Path::new("IP_REP.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("blob")), "application/octet-stream");
    }
}
