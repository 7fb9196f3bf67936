//! Hosted page database adapter.
//!
//! Audits are pages in one database. Fields map to typed page properties,
//! the domain is a relation to a page in a second database whose title is
//! the domain name, and the report is the page body.

use crate::error::{Result, StoreError};
use crate::store::RecordStore;
use async_trait::async_trait;
use mailaudit_core::config::StoreConfig;
use mailaudit_core::{
    AuditField, AuditStatus, Block, FieldKind, FieldMap, FieldValue, FileHandle, Record,
};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;

const NOTION_VERSION: &str = "2022-06-28";
const MAX_TEXT: usize = 2000;
const MAX_CHILDREN_PER_APPEND: usize = 100;
const DOMAIN_RELATION: &str = "Domain";
const DOMAIN_TITLE: &str = "Domain Name";

/// Record store backed by the hosted page database API.
pub struct NotionStore {
    client: Client,
    base_url: String,
    token: String,
    database_id: String,
}

impl NotionStore {
    /// Create a store from configuration.
    ///
    /// # Errors
    /// Returns error if the token or database id is missing.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let token = config
            .notion_token
            .clone()
            .ok_or_else(|| StoreError::Config("NOTION_API_KEY is not set".to_string()))?;
        let database_id = config
            .database_id
            .clone()
            .ok_or_else(|| StoreError::Config("NOTION_AUDITS_DB_ID is not set".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.notion_base_url.trim_end_matches('/').to_string(),
            token,
            database_id,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn list_children(&self, block_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("/blocks/{block_id}/children?page_size=100");
            if let Some(c) = &cursor {
                path.push_str("&start_cursor=");
                path.push_str(c);
            }
            let page = self.send(self.request(Method::GET, &path)).await?;
            ids.extend(
                page.get("results")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|b| b.get("id").and_then(Value::as_str))
                    .map(str::to_string),
            );
            cursor = next_cursor(&page);
            if cursor.is_none() {
                return Ok(ids);
            }
        }
    }
}

fn next_cursor(page: &Value) -> Option<String> {
    if page.get("has_more").and_then(Value::as_bool) == Some(true) {
        page.get("next_cursor")
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        None
    }
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn query_by_status(&self, status: AuditStatus) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": {
                    "property": AuditField::Status.name(),
                    "select": { "equals": status.label() }
                },
                "sorts": [{ "timestamp": "created_time", "direction": "ascending" }]
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let page = self
                .send(
                    self.request(Method::POST, &format!("/databases/{}/query", self.database_id))
                        .json(&body),
                )
                .await?;
            for result in page
                .get("results")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                records.push(decode_page(result)?);
            }
            cursor = next_cursor(&page);
            if cursor.is_none() {
                break;
            }
        }
        tracing::debug!(%status, count = records.len(), "Queried audits");
        Ok(records)
    }

    async fn get_record(&self, record_id: &str) -> Result<Option<Record>> {
        match self
            .send(self.request(Method::GET, &format!("/pages/{record_id}")))
            .await
        {
            Ok(page) => Ok(Some(decode_page(&page)?)),
            Err(StoreError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_fields(&self, record_id: &str, fields: &FieldMap) -> Result<()> {
        let body = json!({ "properties": encode_properties(fields) });
        self.send(
            self.request(Method::PATCH, &format!("/pages/{record_id}"))
                .json(&body),
        )
        .await?;
        tracing::debug!(record_id, fields = fields.len(), "Updated audit fields");
        Ok(())
    }

    async fn related_name(&self, relation_id: &str) -> Result<Option<String>> {
        let page = match self
            .send(self.request(Method::GET, &format!("/pages/{relation_id}")))
            .await
        {
            Ok(page) => page,
            Err(StoreError::Api { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let properties = page.get("properties");
        let named = properties
            .and_then(|p| p.get(DOMAIN_TITLE))
            .map(plain_text)
            .filter(|s| !s.is_empty());
        let any_title = || {
            properties
                .and_then(Value::as_object)
                .and_then(|p| {
                    p.values()
                        .find(|v| v.get("type").and_then(Value::as_str) == Some("title"))
                })
                .map(plain_text)
                .filter(|s| !s.is_empty())
        };
        Ok(named.or_else(any_title))
    }

    async fn replace_content_blocks(&self, record_id: &str, blocks: &[Block]) -> Result<()> {
        let children = self.list_children(record_id).await?;
        for child in &children {
            if let Err(e) = self
                .send(self.request(Method::DELETE, &format!("/blocks/{child}")))
                .await
            {
                tracing::warn!(record_id, block_id = %child, error = %e, "Failed to delete block");
            }
        }
        tracing::debug!(record_id, removed = children.len(), "Cleared page body");
        self.append_content_blocks(record_id, blocks).await
    }

    async fn append_content_blocks(&self, record_id: &str, blocks: &[Block]) -> Result<()> {
        for batch in blocks.chunks(MAX_CHILDREN_PER_APPEND) {
            let children: Vec<Value> = batch.iter().map(encode_block).collect();
            self.send(
                self.request(Method::PATCH, &format!("/blocks/{record_id}/children"))
                    .json(&json!({ "children": children })),
            )
            .await?;
        }
        Ok(())
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<FileHandle> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StoreError::NotFound(path.display().to_string()))?;
        let data = tokio::fs::read(path).await?;

        let created = self
            .send(
                self.request(Method::POST, "/file_uploads")
                    .json(&json!({ "filename": filename, "content_type": mime_type })),
            )
            .await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Decode("file upload has no id".to_string()))?
            .to_string();

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename.clone())
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        self.send(
            self.request(Method::POST, &format!("/file_uploads/{id}/send"))
                .multipart(form),
        )
        .await?;

        tracing::info!(upload_id = %id, %filename, "Uploaded file");
        Ok(FileHandle { id, filename })
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT).collect()
}

fn rich_text(text: &str) -> Value {
    json!([{ "type": "text", "text": { "content": truncate(text) } }])
}

/// Concatenated plain text of a title or rich text property.
fn plain_text(property: &Value) -> String {
    let items = property
        .get("title")
        .or_else(|| property.get("rich_text"))
        .and_then(Value::as_array);
    items
        .into_iter()
        .flatten()
        .filter_map(|item| {
            item.get("plain_text")
                .or_else(|| item.get("text").and_then(|t| t.get("content")))
                .and_then(Value::as_str)
        })
        .collect()
}

/// Encode a field map as page properties.
#[must_use]
pub fn encode_properties(fields: &FieldMap) -> Value {
    let mut properties = Map::new();
    for (field, value) in fields {
        let encoded = match value {
            FieldValue::Text(text) => json!({ "rich_text": rich_text(text) }),
            FieldValue::Number(n) => json!({ "number": n }),
            FieldValue::Select(name) if name.is_empty() => json!({ "select": null }),
            FieldValue::Select(name) => json!({ "select": { "name": name } }),
        };
        properties.insert(field.name().to_string(), encoded);
    }
    Value::Object(properties)
}

/// Decode a page into a record, keeping only catalogued fields.
pub fn decode_page(page: &Value) -> Result<Record> {
    let id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("page has no id".to_string()))?;
    let properties = page
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Decode(format!("page {id} has no properties")))?;

    let title = properties
        .values()
        .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        .map(plain_text)
        .unwrap_or_default();
    let mut record = Record::new(id, title);

    record.domain_relation = properties
        .get(DOMAIN_RELATION)
        .and_then(|p| p.get("relation"))
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .and_then(|r| r.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    for field in AuditField::ALL {
        let Some(property) = properties.get(field.name()) else {
            continue;
        };
        let value = match field.kind() {
            FieldKind::Number => property
                .get("number")
                .and_then(Value::as_f64)
                .map(FieldValue::Number),
            FieldKind::Select => property
                .get("select")
                .and_then(|s| s.get("name"))
                .and_then(Value::as_str)
                .map(|s| FieldValue::Select(s.to_string())),
            FieldKind::Text => Some(FieldValue::Text(plain_text(property))),
        };
        if let Some(value) = value {
            record.fields.insert(field, value);
        }
    }
    Ok(record)
}

/// Encode a display block.
#[must_use]
pub fn encode_block(block: &Block) -> Value {
    let text_block = |kind: &str, text: &str| {
        json!({
            "object": "block",
            "type": kind,
            kind: { "rich_text": rich_text(text) }
        })
    };
    match block {
        Block::Heading1 { text } => text_block("heading_1", text),
        Block::Heading2 { text } => text_block("heading_2", text),
        Block::Paragraph { text } => text_block("paragraph", text),
        Block::Bullet { text } => text_block("bulleted_list_item", text),
        Block::Divider => json!({ "object": "block", "type": "divider", "divider": {} }),
        Block::Image { file, caption } => json!({
            "object": "block",
            "type": "image",
            "image": {
                "type": "file_upload",
                "file_upload": { "id": file.id },
                "caption": rich_text(caption)
            }
        }),
    }
}
