//! crates/marginalia_core/src/testutil.rs
//!
//! In-memory `BackendService` implementation shared by the engine's tests,
//! with switches to simulate the failure modes the components must survive.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    Annotation, AnnotationDraft, AnnotationPatch, Block, BlockContent, Document, ReadingSession,
    ReadingStats, Word,
};
use crate::ports::{BackendService, PortError, PortResult};

pub(crate) fn text_block(id: &str, page: u32, order: u32, words: &[&str]) -> Block {
    Block {
        id: id.to_string(),
        doc_id: "d1".to_string(),
        page_number: page,
        block_order: order,
        content: BlockContent::Text {
            words: words
                .iter()
                .map(|w| Word {
                    text: w.to_string(),
                    ..Word::default()
                })
                .collect(),
        },
    }
}

#[derive(Default)]
pub(crate) struct MockBackend {
    document: Mutex<Option<Document>>,
    blocks: Mutex<Vec<Block>>,
    annotations: Mutex<Vec<Annotation>>,
    block_fetches: Mutex<Vec<(u32, u32)>>,
    next_id: AtomicUsize,
    heartbeats: AtomicUsize,
    fail_fetches: AtomicBool,
    fail_mutations: AtomicBool,
    fail_session_start: AtomicBool,
    fail_heartbeats: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_document(&self, document: Document) {
        *self.document.lock().unwrap() = Some(document);
    }

    pub fn push_block(&self, block: Block) {
        self.blocks.lock().unwrap().push(block);
    }

    pub fn push_annotation(&self, annotation: Annotation) {
        self.annotations.lock().unwrap().push(annotation);
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.lock().unwrap().len()
    }

    pub fn block_fetches(&self) -> Vec<(u32, u32)> {
        self.block_fetches.lock().unwrap().clone()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_session_start(&self, fail: bool) {
        self.fail_session_start.store(fail, Ordering::SeqCst);
    }

    pub fn fail_heartbeats(&self, fail: bool) {
        self.fail_heartbeats.store(fail, Ordering::SeqCst);
    }

    fn mint_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl BackendService for MockBackend {
    async fn get_document(&self, doc_id: &str) -> PortResult<Document> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        self.document
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PortError::NotFound(format!("document {doc_id}")))
    }

    async fn get_page_blocks(&self, _doc_id: &str, page: u32) -> PortResult<Vec<Block>> {
        self.get_block_range(_doc_id, page, page).await
    }

    async fn get_block_range(
        &self,
        _doc_id: &str,
        start_page: u32,
        end_page: u32,
    ) -> PortResult<Vec<Block>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        self.block_fetches.lock().unwrap().push((start_page, end_page));
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.page_number >= start_page && b.page_number <= end_page)
            .cloned()
            .collect())
    }

    async fn split_block(
        &self,
        _doc_id: &str,
        block_id: &str,
        split_index: usize,
    ) -> PortResult<(Block, Block)> {
        let blocks = self.blocks.lock().unwrap();
        let block = blocks
            .iter()
            .find(|b| b.id == block_id)
            .ok_or_else(|| PortError::NotFound(format!("block {block_id}")))?;
        let words = block.words();
        if split_index == 0 || split_index >= words.len() {
            return Err(PortError::Rejected("invalid split index".to_string()));
        }
        let mut first = block.clone();
        let mut second = block.clone();
        first.id = self.mint_id("blk");
        second.id = self.mint_id("blk");
        second.block_order = block.block_order + 1;
        first.content = BlockContent::Text {
            words: words[..split_index].to_vec(),
        };
        second.content = BlockContent::Text {
            words: words[split_index..].to_vec(),
        };
        Ok((first, second))
    }

    async fn list_annotations(&self, doc_id: &str) -> PortResult<Vec<Annotation>> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        Ok(self
            .annotations
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.doc_id == doc_id)
            .cloned()
            .collect())
    }

    async fn create_annotation(&self, draft: &AnnotationDraft) -> PortResult<Annotation> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PortError::Rejected("mutation disabled".to_string()));
        }
        let annotation = Annotation {
            id: self.mint_id("ann"),
            doc_id: draft.doc_id.clone(),
            block_id: draft.block_id.clone(),
            range: draft.range,
            color: draft.color.clone(),
            font_size: draft.font_size.clone(),
            font_style: draft.font_style,
            note: draft.note.clone(),
            user_id: draft.user_id.clone(),
            created_at: Utc::now(),
        };
        self.annotations.lock().unwrap().push(annotation.clone());
        Ok(annotation)
    }

    async fn update_annotation(
        &self,
        annotation_id: &str,
        patch: &AnnotationPatch,
    ) -> PortResult<Annotation> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PortError::Rejected("mutation disabled".to_string()));
        }
        let mut annotations = self.annotations.lock().unwrap();
        let annotation = annotations
            .iter_mut()
            .find(|a| a.id == annotation_id)
            .ok_or_else(|| PortError::NotFound(format!("annotation {annotation_id}")))?;
        if let Some(color) = &patch.color {
            annotation.color = color.clone();
        }
        if let Some(size) = &patch.font_size {
            annotation.font_size = Some(size.clone());
        }
        if let Some(style) = patch.font_style {
            annotation.font_style = Some(style);
        }
        if let Some(note) = &patch.note {
            annotation.note = Some(note.clone());
        }
        Ok(annotation.clone())
    }

    async fn delete_annotation(&self, annotation_id: &str) -> PortResult<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PortError::Rejected("mutation disabled".to_string()));
        }
        let mut annotations = self.annotations.lock().unwrap();
        let before = annotations.len();
        annotations.retain(|a| a.id != annotation_id);
        if annotations.len() == before {
            return Err(PortError::NotFound(format!("annotation {annotation_id}")));
        }
        Ok(())
    }

    async fn start_reading_session(&self, doc_id: &str) -> PortResult<ReadingSession> {
        if self.fail_session_start.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("collector unreachable".to_string()));
        }
        Ok(ReadingSession {
            id: self.mint_id("sess"),
            document_id: doc_id.to_string(),
            start_time: Utc::now(),
            duration_seconds: 0,
        })
    }

    async fn heartbeat(&self, session_id: &str) -> PortResult<ReadingSession> {
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("collector unreachable".to_string()));
        }
        let count = self.heartbeats.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ReadingSession {
            id: session_id.to_string(),
            document_id: "d1".to_string(),
            start_time: Utc::now(),
            duration_seconds: count as u64 * 30,
        })
    }

    async fn reading_stats(&self, _doc_id: &str) -> PortResult<ReadingStats> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        Ok(ReadingStats {
            total_seconds: self.heartbeat_count() as u64 * 30,
            total_sessions: 1,
            last_session_date: Some(Utc::now()),
        })
    }
}
