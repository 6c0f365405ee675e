//! crates/marginalia_core/src/store.rs
//!
//! The annotation store: the authoritative-plus-optimistic annotation set
//! for one open document.
//!
//! Every mutation is optimistic. The local cache changes synchronously,
//! before the backend call resolves, so UI state is always self-consistent;
//! a rejected call rolls the cache back so the visible state never diverges
//! from what the backend actually persisted.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Annotation, AnnotationDraft, AnnotationPatch, TEMP_ID_PREFIX};
use crate::error::{FetchError, MutationError};
use crate::ports::{BackendService, PortError};

pub struct AnnotationStore {
    backend: Arc<dyn BackendService>,
    doc_id: String,
    /// Creation order, earliest first. Renderer precedence depends on it.
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new(backend: Arc<dyn BackendService>, doc_id: impl Into<String>) -> Self {
        Self {
            backend,
            doc_id: doc_id.into(),
            annotations: Vec::new(),
        }
    }

    /// Initial load of the document's annotation list, ordered by creation
    /// time so first-match precedence stays stable across sessions.
    pub async fn load(&mut self) -> Result<(), FetchError> {
        let mut fetched = self.backend.list_annotations(&self.doc_id).await?;
        fetched.sort_by_key(|a| a.created_at);
        debug!(doc_id = %self.doc_id, count = fetched.len(), "annotations loaded");
        self.annotations = fetched;
        Ok(())
    }

    pub fn all(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, annotation_id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == annotation_id)
    }

    /// Annotations attached to `block_id`, in creation order. Ranges are
    /// validated against the block at click and commit time, so attachment
    /// implies intersection.
    pub fn for_block(&self, block_id: &str) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.block_id == block_id)
            .collect()
    }

    /// The annotation winning precedence at one token, if any.
    pub fn at_token(&self, block_id: &str, word_index: usize) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|a| a.block_id == block_id && a.range.contains(word_index))
    }

    /// Optimistic create.
    ///
    /// A tentative record under a locally-minted temporary id is visible
    /// immediately; on success it is swapped in place for the authoritative
    /// record (the two never coexist), on failure it is removed. Returns the
    /// authoritative annotation id.
    pub async fn create(&mut self, draft: AnnotationDraft) -> Result<String, MutationError> {
        let temp_id = format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4());
        self.annotations.push(Annotation {
            id: temp_id.clone(),
            doc_id: draft.doc_id.clone(),
            block_id: draft.block_id.clone(),
            range: draft.range,
            color: draft.color.clone(),
            font_size: draft.font_size.clone(),
            font_style: draft.font_style,
            note: draft.note.clone(),
            user_id: draft.user_id.clone(),
            created_at: chrono::Utc::now(),
        });

        match self.backend.create_annotation(&draft).await {
            Ok(authoritative) => {
                let id = authoritative.id.clone();
                match self.annotations.iter_mut().find(|a| a.id == temp_id) {
                    Some(slot) => *slot = authoritative,
                    None => self.annotations.push(authoritative),
                }
                debug!(annotation_id = %id, "annotation created");
                Ok(id)
            }
            Err(err) => {
                self.annotations.retain(|a| a.id != temp_id);
                warn!(error = %err, "annotation create rejected; rolled back");
                Err(MutationError(err))
            }
        }
    }

    /// Optimistic update (color/style/note only). The patch is applied
    /// locally first; the prior record is restored if the backend rejects
    /// it.
    pub async fn update(
        &mut self,
        annotation_id: &str,
        patch: AnnotationPatch,
    ) -> Result<(), MutationError> {
        let Some(pos) = self.annotations.iter().position(|a| a.id == annotation_id) else {
            return Err(MutationError(PortError::NotFound(format!(
                "annotation {annotation_id}"
            ))));
        };
        let prior = self.annotations[pos].clone();
        apply_patch(&mut self.annotations[pos], &patch);

        match self.backend.update_annotation(annotation_id, &patch).await {
            Ok(authoritative) => {
                if let Some(slot) = self.annotations.iter_mut().find(|a| a.id == annotation_id) {
                    *slot = authoritative;
                }
                Ok(())
            }
            Err(err) => {
                if let Some(slot) = self.annotations.iter_mut().find(|a| a.id == annotation_id) {
                    *slot = prior;
                }
                warn!(error = %err, annotation_id, "annotation update rejected; restored");
                Err(MutationError(err))
            }
        }
    }

    /// Optimistic delete.
    ///
    /// Deleting an id the backend already removed degrades to a no-op once
    /// confirmed absent; a second delete must never corrupt local state.
    pub async fn delete(&mut self, annotation_id: &str) -> Result<(), MutationError> {
        let removed = self
            .annotations
            .iter()
            .position(|a| a.id == annotation_id)
            .map(|pos| (pos, self.annotations.remove(pos)));

        match self.backend.delete_annotation(annotation_id).await {
            Ok(()) => Ok(()),
            Err(PortError::NotFound(_)) => {
                debug!(annotation_id, "delete of an already-absent annotation");
                Ok(())
            }
            Err(err) => {
                if let Some((pos, record)) = removed {
                    let pos = pos.min(self.annotations.len());
                    self.annotations.insert(pos, record);
                }
                warn!(error = %err, annotation_id, "annotation delete rejected; restored");
                Err(MutationError(err))
            }
        }
    }
}

fn apply_patch(target: &mut Annotation, patch: &AnnotationPatch) {
    if let Some(color) = &patch.color {
        target.color = color.clone();
    }
    if let Some(size) = &patch.font_size {
        target.font_size = Some(size.clone());
    }
    if let Some(style) = patch.font_style {
        target.font_style = Some(style);
    }
    if let Some(note) = &patch.note {
        target.note = Some(note.clone());
    }
}
