//! crates/marginalia_core/src/ports.rs
//!
//! Defines the service contracts (traits) at the boundary of the engine.
//! These traits form the hexagonal seam that keeps the core independent of
//! the concrete transport used to reach the reader backend.

use async_trait::async_trait;

use crate::domain::{
    Annotation, AnnotationDraft, AnnotationPatch, Block, Document, ReadingSession, ReadingStats,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors of the transport (HTTP status
/// codes, connection failures) behind the three cases the engine reacts to.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Backend rejected the request: {0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote reader backend that owns documents, blocks, annotations and
/// reading-time records. All persistence is delegated through this port;
/// the engine itself never stores anything durably.
#[async_trait]
pub trait BackendService: Send + Sync {
    // --- Documents & Blocks ---
    async fn get_document(&self, doc_id: &str) -> PortResult<Document>;

    /// All blocks of a single zero-based page, in render order.
    async fn get_page_blocks(&self, doc_id: &str, page: u32) -> PortResult<Vec<Block>>;

    /// Flat sequence of blocks across an inclusive zero-based page range
    /// (the batch form used by the block loader).
    async fn get_block_range(
        &self,
        doc_id: &str,
        start_page: u32,
        end_page: u32,
    ) -> PortResult<Vec<Block>>;

    /// Splits a block at a word boundary; the word at `split_index` becomes
    /// the first word of the second replacement block.
    async fn split_block(
        &self,
        doc_id: &str,
        block_id: &str,
        split_index: usize,
    ) -> PortResult<(Block, Block)>;

    // --- Annotations ---
    async fn list_annotations(&self, doc_id: &str) -> PortResult<Vec<Annotation>>;

    async fn create_annotation(&self, draft: &AnnotationDraft) -> PortResult<Annotation>;

    async fn update_annotation(
        &self,
        annotation_id: &str,
        patch: &AnnotationPatch,
    ) -> PortResult<Annotation>;

    async fn delete_annotation(&self, annotation_id: &str) -> PortResult<()>;

    // --- Reading Time ---
    async fn start_reading_session(&self, doc_id: &str) -> PortResult<ReadingSession>;

    /// Extends a session; the collector closes sessions whose heartbeats
    /// stop.
    async fn heartbeat(&self, session_id: &str) -> PortResult<ReadingSession>;

    async fn reading_stats(&self, doc_id: &str) -> PortResult<ReadingStats>;
}
