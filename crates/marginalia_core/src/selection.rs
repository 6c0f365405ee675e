//! crates/marginalia_core/src/selection.rs
//!
//! The two-click range-selection state machine.
//!
//! Token clicks arrive strictly in order and every transition is a
//! synchronous, atomic state update. Creating a new annotation and editing
//! an existing one converge here: both resolve through [`SelectionMachine::commit`]
//! into a single tagged [`CommitIntent`], so the attribute menu drives one
//! code path instead of two.

use crate::domain::{Annotation, AnnotationAttrs, WordRange};
use crate::error::CrossBlockSelectionError;
use crate::token::TokenAddress;

/// The machine's current state.
///
/// `RangeCommitted` is transient: it holds the normalized range while the
/// attribute menu is open and resolves back to `Idle` on commit or cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    /// First token picked; the owning block is locked for this selection.
    StartSelected { anchor: TokenAddress },
    /// Both tokens picked; range normalized regardless of click direction.
    RangeCommitted { block_id: String, range: WordRange },
    /// An existing annotation is targeted; no range selection is active.
    Editing {
        annotation_id: String,
        prefill: AnnotationAttrs,
    },
}

/// What a click transition asks the surrounding UI to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The clicked address resolves to no loaded word; nothing changed.
    Ignored,
    /// First token picked; nothing to show yet.
    SelectionStarted,
    /// Second token picked; preview the range and open the menu.
    RangeReady { block_id: String, range: WordRange },
    /// An annotated token was clicked; open the menu prefilled for editing.
    EditOpened {
        annotation_id: String,
        prefill: AnnotationAttrs,
    },
}

/// What a commit resolves to: the single converging path for the create
/// flow and the edit flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitIntent {
    Create {
        block_id: String,
        range: WordRange,
        attrs: AnnotationAttrs,
    },
    Update {
        annotation_id: String,
        attrs: AnnotationAttrs,
    },
}

#[derive(Debug, Default)]
pub struct SelectionMachine {
    state: SelectionState,
}

impl Default for SelectionState {
    fn default() -> Self {
        SelectionState::Idle
    }
}

impl SelectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SelectionState::Idle
    }

    /// Feeds one token click through the machine.
    ///
    /// `annotated` carries the annotation already winning at the clicked
    /// token, if any; outside an active selection such a click targets that
    /// annotation for editing instead of starting a new range.
    pub fn token_click(
        &mut self,
        addr: TokenAddress,
        annotated: Option<&Annotation>,
    ) -> Result<ClickOutcome, CrossBlockSelectionError> {
        match &self.state {
            SelectionState::StartSelected { anchor } => {
                if anchor.block_id != addr.block_id {
                    // Selections never span blocks: reject, keep nothing.
                    let err = CrossBlockSelectionError {
                        started_in: anchor.block_id.clone(),
                        clicked: addr.block_id.clone(),
                    };
                    self.state = SelectionState::Idle;
                    return Err(err);
                }
                let range = WordRange::from_clicks(anchor.word_index, addr.word_index);
                let block_id = anchor.block_id.clone();
                self.state = SelectionState::RangeCommitted {
                    block_id: block_id.clone(),
                    range,
                };
                Ok(ClickOutcome::RangeReady { block_id, range })
            }
            // Idle, or a click while a menu was open: the previous state is
            // discarded and the click is treated fresh.
            _ => {
                if let Some(annotation) = annotated {
                    let prefill = AnnotationAttrs {
                        color: Some(annotation.color.clone()),
                        font_size: annotation.font_size.clone(),
                        font_style: annotation.font_style,
                        note: annotation.note.clone(),
                    };
                    self.state = SelectionState::Editing {
                        annotation_id: annotation.id.clone(),
                        prefill: prefill.clone(),
                    };
                    Ok(ClickOutcome::EditOpened {
                        annotation_id: annotation.id.clone(),
                        prefill,
                    })
                } else {
                    self.state = SelectionState::StartSelected { anchor: addr };
                    Ok(ClickOutcome::SelectionStarted)
                }
            }
        }
    }

    /// An outside click or explicit cancel: back to `Idle`, clearing all
    /// transient fields.
    pub fn cancel(&mut self) {
        self.state = SelectionState::Idle;
    }

    /// Resolves the active state into a commit intent and resets to `Idle`.
    ///
    /// Returns `None` (leaving the state untouched) when nothing is
    /// committable: idle, or only the start of a range picked.
    pub fn commit(&mut self, attrs: AnnotationAttrs) -> Option<CommitIntent> {
        match std::mem::replace(&mut self.state, SelectionState::Idle) {
            SelectionState::RangeCommitted { block_id, range } => Some(CommitIntent::Create {
                block_id,
                range,
                attrs,
            }),
            SelectionState::Editing { annotation_id, .. } => Some(CommitIntent::Update {
                annotation_id,
                attrs,
            }),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// The range to preview on a block while a selection is in progress
    /// there. A lone anchor previews as its single word.
    pub fn preview(&self, block_id: &str) -> Option<WordRange> {
        match &self.state {
            SelectionState::StartSelected { anchor } if anchor.block_id == block_id => {
                Some(WordRange::from_clicks(anchor.word_index, anchor.word_index))
            }
            SelectionState::RangeCommitted {
                block_id: selected, range,
            } if selected == block_id => Some(*range),
            _ => None,
        }
    }
}
