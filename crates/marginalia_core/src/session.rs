//! crates/marginalia_core/src/session.rs
//!
//! The per-document reader session: the single owner of all mutable engine
//! state for one open document. Created on reader-open, torn down on
//! reader-close; nothing here is a process-wide singleton.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    Annotation, AnnotationAttrs, AnnotationDraft, AnnotationPatch, Block, Document, ReadingStats,
    WordRange, DEFAULT_HIGHLIGHT_COLOR,
};
use crate::error::{CrossBlockSelectionError, FetchError, MutationError};
use crate::loader::BlockLoader;
use crate::ports::{BackendService, PortError, PortResult};
use crate::render::{block_visuals, TokenVisual};
use crate::selection::{ClickOutcome, CommitIntent, SelectionMachine, SelectionState};
use crate::store::AnnotationStore;
use crate::token::TokenAddress;
use crate::tracker::SessionTracker;

pub struct ReaderSession {
    backend: Arc<dyn BackendService>,
    document: Document,
    user_id: String,
    loader: BlockLoader,
    store: AnnotationStore,
    selection: SelectionMachine,
    tracker: SessionTracker,
    /// Block and range to pulse after navigating to an annotation from the
    /// sidebar. Cosmetic only.
    attention: Option<(String, WordRange)>,
}

impl ReaderSession {
    /// Opens a reader session: document snapshot, annotation list, initial
    /// block batch, reading-time tracking.
    ///
    /// A document or annotation load failure is fatal to the open; the
    /// reader cannot proceed without them. A tracking failure is not.
    pub async fn open(
        backend: Arc<dyn BackendService>,
        doc_id: &str,
        user_id: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let document = backend.get_document(doc_id).await?;
        info!(
            doc_id,
            title = %document.title,
            total_pages = document.total_pages,
            "document loaded"
        );

        let mut store = AnnotationStore::new(backend.clone(), doc_id);
        store.load().await?;

        let mut loader = BlockLoader::new(backend.clone(), doc_id, document.total_pages);
        loader.load_initial().await?;

        let tracker = SessionTracker::start(backend.clone(), doc_id).await;

        Ok(Self {
            backend,
            document,
            user_id: user_id.into(),
            loader,
            store,
            selection: SelectionMachine::new(),
            tracker,
            attention: None,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn annotations(&self) -> &[Annotation] {
        self.store.all()
    }

    pub fn selection_state(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn tracking_session_id(&self) -> Option<&str> {
        self.tracker.session_id()
    }

    /// Blocks of a zero-based page, in render order; empty while unloaded.
    pub fn page_blocks(&self, page: u32) -> &[Block] {
        self.loader.page_blocks(page).unwrap_or(&[])
    }

    /// Feeds one token click through the selection machine, routing clicks
    /// on annotated tokens into the edit flow.
    ///
    /// A click whose address has no backing word in the token index is
    /// ignored outright, so no range can ever be anchored or completed
    /// outside the owning block's word count.
    pub fn token_click(
        &mut self,
        addr: TokenAddress,
    ) -> Result<ClickOutcome, CrossBlockSelectionError> {
        if self.loader.tokens().lookup(&addr).is_none() {
            debug!(token = %addr, "click on a token with no backing word; ignored");
            return Ok(ClickOutcome::Ignored);
        }
        let annotated = self.store.at_token(&addr.block_id, addr.word_index).cloned();
        self.selection.token_click(addr, annotated.as_ref())
    }

    /// An outside click or explicit cancel.
    pub fn cancel_selection(&mut self) {
        self.selection.cancel();
    }

    /// Commits the active selection or edit with the chosen attributes.
    ///
    /// Returns the id of the affected annotation (the authoritative id for
    /// a create), or `None` when there was nothing to commit.
    pub async fn commit(
        &mut self,
        attrs: AnnotationAttrs,
    ) -> Result<Option<String>, MutationError> {
        let Some(intent) = self.selection.commit(attrs) else {
            return Ok(None);
        };
        match intent {
            CommitIntent::Create {
                block_id,
                range,
                attrs,
            } => {
                // The block may have been replaced (split) while the menu
                // was open; a range outside its block must never persist.
                let fits = self
                    .loader
                    .tokens()
                    .word_count(&block_id)
                    .is_some_and(|count| range.fits(count));
                if !fits {
                    warn!(%block_id, "commit range no longer lies within its block; dropped");
                    return Err(MutationError(PortError::Rejected(
                        "selection range outside its block".to_string(),
                    )));
                }
                let draft = AnnotationDraft {
                    doc_id: self.document.id.clone(),
                    block_id,
                    range,
                    color: attrs
                        .color
                        .unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string()),
                    font_size: attrs.font_size,
                    font_style: attrs.font_style,
                    note: attrs.note,
                    user_id: self.user_id.clone(),
                };
                let id = self.store.create(draft).await?;
                Ok(Some(id))
            }
            CommitIntent::Update {
                annotation_id,
                attrs,
            } => {
                let patch = AnnotationPatch {
                    color: attrs.color,
                    font_size: attrs.font_size,
                    font_style: attrs.font_style,
                    note: attrs.note,
                };
                self.store.update(&annotation_id, patch).await?;
                Ok(Some(annotation_id))
            }
        }
    }

    /// Deletes an annotation, from the edit menu or the sidebar.
    pub async fn delete_annotation(&mut self, annotation_id: &str) -> Result<(), MutationError> {
        self.selection.cancel();
        self.store.delete(annotation_id).await
    }

    /// Per-token visuals for one block. Unloaded and image blocks yield an
    /// empty token set, rendered as a placeholder rather than an error.
    pub fn render_block(&self, block_id: &str) -> Vec<TokenVisual> {
        let Some(words) = self.loader.tokens().block_words(block_id) else {
            return Vec::new();
        };
        let annotations = self.store.for_block(block_id);
        let preview = self.selection.preview(block_id);
        let attention = self
            .attention
            .as_ref()
            .filter(|(id, _)| id == block_id)
            .map(|(_, range)| *range);
        block_visuals(&words, &annotations, preview, attention)
    }

    /// One-based page counter from the reader chrome; may trigger a
    /// look-ahead batch. A prefetch failure is non-blocking: it is logged
    /// and the next page change retries.
    pub async fn visible_page_changed(&mut self, visible_page: u32) {
        if let Err(err) = self.loader.visible_page_changed(visible_page).await {
            warn!(error = %err, visible_page, "block prefetch failed");
        }
    }

    /// Navigates to an annotation from the sidebar: clears any selection,
    /// arms the attention pulse on its range, and returns the zero-based
    /// page to scroll to if the block is loaded.
    pub fn focus_annotation(&mut self, annotation_id: &str) -> Option<u32> {
        let annotation = self.store.get(annotation_id)?;
        let block_id = annotation.block_id.clone();
        let range = annotation.range;
        self.selection.cancel();
        self.attention = Some((block_id.clone(), range));
        self.loader.block(&block_id).map(|b| b.page_number)
    }

    /// Ends the attention pulse once the presentation layer has played it.
    pub fn clear_attention(&mut self) {
        self.attention = None;
    }

    /// Splits a block at a word boundary through the backend and swaps the
    /// two replacement blocks into the page map.
    pub async fn split_block(&mut self, block_id: &str, split_index: usize) -> PortResult<()> {
        let (first, second) = self
            .backend
            .split_block(&self.document.id, block_id, split_index)
            .await?;
        self.loader.replace_block(block_id, first, second);
        Ok(())
    }

    /// Accumulated reading time for the document.
    pub async fn reading_stats(&self) -> Result<ReadingStats, FetchError> {
        Ok(self.backend.reading_stats(&self.document.id).await?)
    }

    /// Closes the session: one final heartbeat, tracker teardown. Any
    /// still-unresolved backend calls are dropped with the session.
    pub async fn close(self) {
        self.tracker.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FontStyle;
    use crate::render::SELECTION_FILL;
    use crate::testutil::{text_block, MockBackend};

    fn seeded_backend() -> Arc<MockBackend> {
        let backend = MockBackend::new();
        backend.set_document(Document {
            id: "d1".to_string(),
            title: "Walden".to_string(),
            total_pages: 2,
            theme: "plain".to_string(),
            toc: Vec::new(),
        });
        backend.push_block(text_block(
            "b1",
            0,
            0,
            &["I", "went", "to", "the", "woods", "deliberately"],
        ));
        backend.push_block(text_block("b2", 0, 1, &["to", "front", "only", "the"]));
        Arc::new(backend)
    }

    async fn open_session(backend: &Arc<MockBackend>) -> ReaderSession {
        ReaderSession::open(backend.clone() as Arc<dyn BackendService>, "d1", "user")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_fails_without_the_document() {
        let backend = Arc::new(MockBackend::new());
        let result = ReaderSession::open(backend as Arc<dyn BackendService>, "d1", "user").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn select_commit_and_render_a_highlight() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        session.token_click(TokenAddress::new("b1", 4)).unwrap();
        // Mid-selection the preview shows on the anchor token.
        assert_eq!(
            session.render_block("b1")[4].fill.as_deref(),
            Some(SELECTION_FILL)
        );

        session.token_click(TokenAddress::new("b1", 1)).unwrap();
        let id = session
            .commit(AnnotationAttrs {
                color: Some("#ffeb3b".to_string()),
                note: Some("why he went".to_string()),
                ..AnnotationAttrs::default()
            })
            .await
            .unwrap()
            .unwrap();

        // End-then-start clicks normalized to [1, 5).
        let ann = session.annotations().first().unwrap();
        assert_eq!(ann.id, id);
        assert_eq!((ann.range.start(), ann.range.end()), (1, 5));

        let visuals = session.render_block("b1");
        assert!(visuals[0].fill.is_none());
        assert_eq!(visuals[1].fill.as_deref(), Some("#ffeb3b"));
        assert_eq!(visuals[4].note.as_deref(), Some("why he went"));
        assert!(visuals[5].fill.is_none());
        // Selection cleared on commit.
        assert!(matches!(session.selection_state(), SelectionState::Idle));

        session.close().await;
    }

    #[tokio::test]
    async fn cross_block_selection_surfaces_and_resets() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        session.token_click(TokenAddress::new("b1", 0)).unwrap();
        let err = session.token_click(TokenAddress::new("b2", 1)).unwrap_err();
        assert_eq!(err.started_in, "b1");
        assert!(matches!(session.selection_state(), SelectionState::Idle));
        // Nothing was created.
        assert!(session.commit(AnnotationAttrs::default()).await.unwrap().is_none());
        assert!(session.annotations().is_empty());
    }

    #[tokio::test]
    async fn clicking_a_highlight_edits_instead_of_creating() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        session.token_click(TokenAddress::new("b1", 0)).unwrap();
        session.token_click(TokenAddress::new("b1", 2)).unwrap();
        let id = session
            .commit(AnnotationAttrs {
                color: Some("#ffeb3b".to_string()),
                ..AnnotationAttrs::default()
            })
            .await
            .unwrap()
            .unwrap();

        let outcome = session.token_click(TokenAddress::new("b1", 1)).unwrap();
        match outcome {
            ClickOutcome::EditOpened {
                annotation_id,
                prefill,
            } => {
                assert_eq!(annotation_id, id);
                assert_eq!(prefill.color.as_deref(), Some("#ffeb3b"));
            }
            other => panic!("expected edit outcome, got {other:?}"),
        }

        let committed = session
            .commit(AnnotationAttrs {
                color: Some("#a5d6a7".to_string()),
                font_style: Some(FontStyle::Underline),
                ..AnnotationAttrs::default()
            })
            .await
            .unwrap();
        assert_eq!(committed.as_deref(), Some(id.as_str()));

        // An update, never a second create.
        assert_eq!(session.annotations().len(), 1);
        assert_eq!(backend.annotation_count(), 1);
        let visuals = session.render_block("b1");
        assert_eq!(visuals[1].underline.as_deref(), Some("#a5d6a7"));
        assert!(visuals[1].fill.is_none());
    }

    #[tokio::test]
    async fn rejected_create_leaves_no_trace() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        session.token_click(TokenAddress::new("b1", 0)).unwrap();
        session.token_click(TokenAddress::new("b1", 2)).unwrap();
        backend.fail_mutations(true);
        assert!(session.commit(AnnotationAttrs::default()).await.is_err());

        assert!(session.annotations().is_empty());
        assert!(session.render_block("b1").iter().all(|v| v.fill.is_none()));
    }

    #[tokio::test]
    async fn focus_annotation_arms_the_pulse() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;
        session.token_click(TokenAddress::new("b1", 2)).unwrap();
        session.token_click(TokenAddress::new("b1", 3)).unwrap();
        let id = session
            .commit(AnnotationAttrs::default())
            .await
            .unwrap()
            .unwrap();

        let page = session.focus_annotation(&id);
        assert_eq!(page, Some(0));
        let visuals = session.render_block("b1");
        assert!(visuals[2].pulse && visuals[3].pulse);
        assert!(!visuals[1].pulse);

        session.clear_attention();
        assert!(session.render_block("b1").iter().all(|v| !v.pulse));
    }

    #[tokio::test]
    async fn split_swaps_replacement_blocks_in() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        session.split_block("b1", 3).await.unwrap();
        let ids: Vec<&str> = session
            .page_blocks(0)
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&"b1"));
        assert!(session.render_block("b1").is_empty());
    }

    #[tokio::test]
    async fn out_of_range_click_is_ignored() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        // Past the end of a 6-word block, and on a block that never loaded.
        let outcome = session.token_click(TokenAddress::new("b1", 999)).unwrap();
        assert_eq!(outcome, ClickOutcome::Ignored);
        let outcome = session.token_click(TokenAddress::new("missing", 0)).unwrap();
        assert_eq!(outcome, ClickOutcome::Ignored);
        assert!(matches!(session.selection_state(), SelectionState::Idle));

        // A locked anchor survives an out-of-range second click unchanged.
        session.token_click(TokenAddress::new("b1", 0)).unwrap();
        let outcome = session.token_click(TokenAddress::new("b1", 999)).unwrap();
        assert_eq!(outcome, ClickOutcome::Ignored);
        assert!(session
            .commit(AnnotationAttrs::default())
            .await
            .unwrap()
            .is_none());
        assert!(session.annotations().is_empty());

        // Every committed range stays inside its block's word count.
        session.token_click(TokenAddress::new("b1", 5)).unwrap();
        session.commit(AnnotationAttrs::default()).await.unwrap();
        for ann in session.annotations() {
            assert!(ann.range.fits(session.render_block(&ann.block_id).len()));
        }
    }

    #[tokio::test]
    async fn commit_rejects_a_range_outside_its_block() {
        let backend = seeded_backend();
        let mut session = open_session(&backend).await;

        session.token_click(TokenAddress::new("b1", 2)).unwrap();
        session.token_click(TokenAddress::new("b1", 5)).unwrap();
        // The block is split out from under the open menu.
        session.split_block("b1", 3).await.unwrap();

        assert!(session.commit(AnnotationAttrs::default()).await.is_err());
        assert!(session.annotations().is_empty());
        assert_eq!(backend.annotation_count(), 0);
        assert!(matches!(session.selection_state(), SelectionState::Idle));
    }

    #[tokio::test]
    async fn unloaded_block_renders_as_placeholder() {
        let backend = seeded_backend();
        let session = open_session(&backend).await;
        assert!(session.render_block("missing").is_empty());
    }
}
