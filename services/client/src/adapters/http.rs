//! services/client/src/adapters/http.rs
//!
//! This module contains the HTTP adapter, the concrete implementation of
//! the `BackendService` port from the `core` crate. It handles all
//! interactions with the reader backend's REST API using `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use marginalia_core::domain::{
    Annotation, AnnotationDraft, AnnotationPatch, Block, BlockContent, Document, FontStyle,
    ReadingSession, ReadingStats, TocEntry, Word, WordStyle, DEFAULT_HIGHLIGHT_COLOR,
};
use marginalia_core::error::ParseError;
use marginalia_core::ports::{BackendService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An HTTP adapter that implements the `BackendService` port.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` against the given base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PortResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> PortResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> PortResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> PortResult<T> {
        let response = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn delete(&self, path: &str) -> PortResult<()> {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(status_error(status, error_detail(response).await))
    }
}

fn transport(err: reqwest::Error) -> PortError {
    PortError::Unexpected(err.to_string())
}

/// Decodes a response body, translating non-2xx statuses through the
/// backend's `{"detail": ...}` error payload.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> PortResult<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(transport);
    }
    Err(status_error(status, error_detail(response).await))
}

fn status_error(status: StatusCode, detail: String) -> PortError {
    if status == StatusCode::NOT_FOUND {
        PortError::NotFound(detail)
    } else if status.is_client_error() {
        PortError::Rejected(detail)
    } else {
        PortError::Unexpected(format!("{status}: {detail}"))
    }
}

async fn error_detail(response: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: String,
    }
    match response.json::<ErrorBody>().await {
        Ok(body) => body.detail,
        Err(_) => "no detail provided".to_string(),
    }
}

//=========================================================================================
// "Impure" Wire Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct DocumentRecord {
    id: String,
    title: String,
    total_pages: u32,
    theme: Option<String>,
    toc: Option<serde_json::Value>,
}

impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            title: self.title,
            total_pages: self.total_pages,
            theme: self.theme.unwrap_or_else(|| "plain".to_string()),
            toc: self.toc.map(parse_toc).unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct TocEntryRecord {
    level: Option<u8>,
    title: String,
    page: u32,
}

/// The backend stores the table of contents as a JSON column that some
/// deployments return pre-parsed and some as an embedded JSON string.
fn parse_toc(value: serde_json::Value) -> Vec<TocEntry> {
    let value = match value {
        serde_json::Value::String(raw) => match serde_json::from_str(&raw) {
            Ok(inner) => inner,
            Err(err) => {
                warn!(error = %err, "malformed table of contents; dropping");
                return Vec::new();
            }
        },
        serde_json::Value::Null => return Vec::new(),
        other => other,
    };
    match serde_json::from_value::<Vec<TocEntryRecord>>(value) {
        Ok(entries) => entries
            .into_iter()
            .map(|e| TocEntry {
                level: e.level.unwrap_or(1),
                title: e.title,
                page: e.page,
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, "malformed table of contents; dropping");
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
struct BlockRecord {
    id: String,
    doc_id: String,
    page_number: u32,
    block_order: u32,
    block_type: Option<String>,
    text: Option<String>,
    image_path: Option<String>,
    words_meta: Option<serde_json::Value>,
}

impl BlockRecord {
    /// Malformed word metadata degrades the block to plain-text words; the
    /// page must render even when one block's metadata is bad.
    fn to_domain(self) -> Block {
        let content = if self.block_type.as_deref() == Some("image") {
            BlockContent::Image {
                path: self.image_path.unwrap_or_default(),
            }
        } else {
            let words = match parse_words(self.words_meta) {
                Ok(words) => words,
                Err(err) => {
                    warn!(block_id = %self.id, error = %err, "falling back to plain-text words");
                    Word::plain_words(self.text.as_deref().unwrap_or_default())
                }
            };
            BlockContent::Text { words }
        };
        Block {
            id: self.id,
            doc_id: self.doc_id,
            page_number: self.page_number,
            block_order: self.block_order,
            content,
        }
    }
}

#[derive(Deserialize)]
struct WordRecord {
    text: String,
    #[serde(rename = "fontSize")]
    font_size: Option<f32>,
    #[serde(rename = "fontFamily")]
    font_family: Option<String>,
    #[serde(rename = "isBold", default)]
    bold: bool,
    #[serde(rename = "isItalic", default)]
    italic: bool,
    color: Option<String>,
    #[serde(rename = "isNewline", default)]
    newline: bool,
    y: Option<f32>,
}

/// Parses the `words_meta` payload, which arrives either as a JSON array or
/// as a JSON-encoded string of one.
fn parse_words(meta: Option<serde_json::Value>) -> Result<Vec<Word>, ParseError> {
    let value = match meta {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::String(raw)) => {
            serde_json::from_str(&raw).map_err(|e| ParseError(e.to_string()))?
        }
        Some(other) => other,
    };
    let records: Vec<WordRecord> =
        serde_json::from_value(value).map_err(|e| ParseError(e.to_string()))?;
    Ok(records
        .into_iter()
        .map(|w| Word {
            text: w.text,
            style: WordStyle {
                font_size: w.font_size,
                font_family: w.font_family,
                bold: w.bold,
                italic: w.italic,
                color: w.color,
            },
            newline: w.newline,
            newline_offset: if w.newline { w.y } else { None },
        })
        .collect())
}

#[derive(Deserialize)]
struct AnnotationRecord {
    id: String,
    doc_id: String,
    block_id: String,
    start_word_index: usize,
    end_word_index: usize,
    color: Option<String>,
    font_size: Option<String>,
    font_style: Option<String>,
    note: Option<String>,
    user_id: Option<String>,
    created_at: Option<String>,
}

impl AnnotationRecord {
    fn to_domain(self) -> Result<Annotation, ParseError> {
        if self.end_word_index < self.start_word_index {
            return Err(ParseError(format!(
                "annotation {} has an inverted range",
                self.id
            )));
        }
        // Legacy records used an inclusive end for single-word highlights;
        // widen those to the half-open form.
        let end = self.end_word_index.max(self.start_word_index + 1);
        let range = marginalia_core::domain::WordRange::new(self.start_word_index, end)
            .ok_or_else(|| ParseError(format!("annotation {} has an empty range", self.id)))?;
        Ok(Annotation {
            range,
            color: self
                .color
                .unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string()),
            font_style: self.font_style.as_deref().and_then(FontStyle::parse),
            created_at: self
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            id: self.id,
            doc_id: self.doc_id,
            block_id: self.block_id,
            font_size: self.font_size,
            note: self.note,
            user_id: self.user_id.unwrap_or_else(|| "anonymous".to_string()),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<DateTime<Utc>>().ok())
}

#[derive(Deserialize)]
struct ReadingSessionRecord {
    id: String,
    document_id: String,
    start_time: Option<String>,
    #[serde(default)]
    duration_seconds: u64,
}

impl ReadingSessionRecord {
    fn to_domain(self) -> ReadingSession {
        ReadingSession {
            id: self.id,
            document_id: self.document_id,
            start_time: self
                .start_time
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            duration_seconds: self.duration_seconds,
        }
    }
}

#[derive(Deserialize)]
struct StatsRecord {
    #[serde(default)]
    total_seconds: u64,
    #[serde(default)]
    total_sessions: u64,
    last_session_date: Option<String>,
}

impl StatsRecord {
    fn to_domain(self) -> ReadingStats {
        ReadingStats {
            total_seconds: self.total_seconds,
            total_sessions: self.total_sessions,
            last_session_date: self.last_session_date.as_deref().and_then(parse_timestamp),
        }
    }
}

//=========================================================================================
// Request Payloads
//=========================================================================================

#[derive(Serialize)]
struct CreateAnnotationBody<'a> {
    doc_id: &'a str,
    block_id: &'a str,
    start_word_index: usize,
    end_word_index: usize,
    color: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    font_size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    font_style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    user_id: &'a str,
}

#[derive(Serialize)]
struct UpdateAnnotationBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    font_size: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    font_style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Serialize)]
struct SplitBody {
    split_index: usize,
}

#[derive(Serialize)]
struct StartReadingBody<'a> {
    document_id: &'a str,
}

//=========================================================================================
// Port Implementation
//=========================================================================================

#[async_trait]
impl BackendService for HttpBackend {
    async fn get_document(&self, doc_id: &str) -> PortResult<Document> {
        let record: DocumentRecord = self.get_json(&format!("/api/documents/{doc_id}")).await?;
        Ok(record.to_domain())
    }

    async fn get_page_blocks(&self, doc_id: &str, page: u32) -> PortResult<Vec<Block>> {
        let records: Vec<BlockRecord> = self
            .get_json(&format!("/api/documents/{doc_id}/pages/{page}/blocks"))
            .await?;
        Ok(records.into_iter().map(BlockRecord::to_domain).collect())
    }

    async fn get_block_range(
        &self,
        doc_id: &str,
        start_page: u32,
        end_page: u32,
    ) -> PortResult<Vec<Block>> {
        let records: Vec<BlockRecord> = self
            .get_json(&format!(
                "/api/documents/{doc_id}/blocks?start={start_page}&end={end_page}"
            ))
            .await?;
        Ok(records.into_iter().map(BlockRecord::to_domain).collect())
    }

    async fn split_block(
        &self,
        doc_id: &str,
        block_id: &str,
        split_index: usize,
    ) -> PortResult<(Block, Block)> {
        let records: Vec<BlockRecord> = self
            .post_json(
                &format!("/api/documents/{doc_id}/blocks/{block_id}/split"),
                &SplitBody { split_index },
            )
            .await?;
        let mut records = records.into_iter();
        match (records.next(), records.next()) {
            (Some(first), Some(second)) => Ok((first.to_domain(), second.to_domain())),
            _ => Err(PortError::Unexpected(
                "split returned fewer than two blocks".to_string(),
            )),
        }
    }

    async fn list_annotations(&self, doc_id: &str) -> PortResult<Vec<Annotation>> {
        let records: Vec<AnnotationRecord> = self
            .get_json(&format!("/api/documents/{doc_id}/annotations"))
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record.to_domain() {
                Ok(annotation) => Some(annotation),
                Err(err) => {
                    warn!(error = %err, "skipping malformed annotation");
                    None
                }
            })
            .collect())
    }

    async fn create_annotation(&self, draft: &AnnotationDraft) -> PortResult<Annotation> {
        let body = CreateAnnotationBody {
            doc_id: &draft.doc_id,
            block_id: &draft.block_id,
            start_word_index: draft.range.start(),
            end_word_index: draft.range.end(),
            color: &draft.color,
            font_size: draft.font_size.as_deref(),
            font_style: draft.font_style.map(|s| s.as_str()),
            note: draft.note.as_deref(),
            user_id: &draft.user_id,
        };
        let record: AnnotationRecord = self.post_json("/api/annotations", &body).await?;
        record
            .to_domain()
            .map_err(|err| PortError::Unexpected(err.to_string()))
    }

    async fn update_annotation(
        &self,
        annotation_id: &str,
        patch: &AnnotationPatch,
    ) -> PortResult<Annotation> {
        let body = UpdateAnnotationBody {
            color: patch.color.as_deref(),
            font_size: patch.font_size.as_deref(),
            font_style: patch.font_style.map(|s| s.as_str()),
            note: patch.note.as_deref(),
        };
        let record: AnnotationRecord = self
            .put_json(&format!("/api/annotations/{annotation_id}"), &body)
            .await?;
        record
            .to_domain()
            .map_err(|err| PortError::Unexpected(err.to_string()))
    }

    async fn delete_annotation(&self, annotation_id: &str) -> PortResult<()> {
        self.delete(&format!("/api/annotations/{annotation_id}"))
            .await
    }

    async fn start_reading_session(&self, doc_id: &str) -> PortResult<ReadingSession> {
        let record: ReadingSessionRecord = self
            .post_json("/api/reading/start", &StartReadingBody { document_id: doc_id })
            .await?;
        Ok(record.to_domain())
    }

    async fn heartbeat(&self, session_id: &str) -> PortResult<ReadingSession> {
        let record: ReadingSessionRecord = self
            .post_empty(&format!("/api/reading/{session_id}/heartbeat"))
            .await?;
        Ok(record.to_domain())
    }

    async fn reading_stats(&self, doc_id: &str) -> PortResult<ReadingStats> {
        let record: StatsRecord = self
            .get_json(&format!("/api/documents/{doc_id}/stats"))
            .await?;
        Ok(record.to_domain())
    }
}
