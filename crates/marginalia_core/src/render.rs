//! crates/marginalia_core/src/render.rs
//!
//! The highlight renderer: a pure projection from one block's tokens and the
//! annotations intersecting it to per-token visual attributes. No side
//! effects beyond the returned contract.

use crate::domain::{Annotation, FontStyle, Word, WordRange};

/// Background fill applied to tokens inside the pending selection preview.
pub const SELECTION_FILL: &str = "#93c5fd";

/// The per-token visual contract handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenVisual {
    /// Background fill. Suppressed when the winning annotation's style is
    /// `Underline`: an underline is visually mutually exclusive with a fill
    /// on the same token.
    pub fill: Option<String>,
    /// Underline color, from an `Underline`-styled annotation.
    pub underline: Option<String>,
    pub bold: bool,
    pub italic: bool,
    /// Font-size override: the winning annotation's if set, else the word's
    /// own source size.
    pub font_size: Option<String>,
    /// Text color carried by the word from the source document.
    pub color: Option<String>,
    /// Note text for the dotted-underline indicator and tooltip.
    pub note: Option<String>,
    /// Token sits inside the in-progress selection preview.
    pub selected: bool,
    /// Token is inside an attention pulse (navigation from the sidebar).
    pub pulse: bool,
    /// A line break follows this token.
    pub line_break: bool,
}

/// Computes the visual contract for every token of one block.
///
/// `annotations` must be in creation order, earliest first: for a token
/// covered by several ranges, the first annotation containing it wins the
/// fill/underline decision, and only the winner's style flags apply.
pub fn block_visuals(
    words: &[Word],
    annotations: &[&Annotation],
    preview: Option<WordRange>,
    attention: Option<WordRange>,
) -> Vec<TokenVisual> {
    words
        .iter()
        .enumerate()
        .map(|(index, word)| token_visual(index, word, annotations, preview, attention))
        .collect()
}

fn token_visual(
    index: usize,
    word: &Word,
    annotations: &[&Annotation],
    preview: Option<WordRange>,
    attention: Option<WordRange>,
) -> TokenVisual {
    let mut visual = TokenVisual {
        bold: word.style.bold,
        italic: word.style.italic,
        color: word.style.color.clone(),
        font_size: word.style.font_size.map(|size| format!("{size}pt")),
        line_break: word.newline,
        ..TokenVisual::default()
    };

    let winner = annotations
        .iter()
        .find(|a| a.range.contains(index))
        .copied();

    if let Some(annotation) = winner {
        match annotation.font_style {
            Some(FontStyle::Bold) => visual.bold = true,
            Some(FontStyle::Italic) => visual.italic = true,
            Some(FontStyle::Underline) => visual.underline = Some(annotation.color.clone()),
            None => {}
        }
        if visual.underline.is_none() {
            visual.fill = Some(annotation.color.clone());
        }
        if let Some(size) = &annotation.font_size {
            visual.font_size = Some(size.clone());
        }
        if annotation.has_note() {
            visual.note = annotation.note.clone();
        }
    }

    // The user must see what they are about to commit, not the prior state.
    if preview.is_some_and(|range| range.contains(index)) {
        visual.selected = true;
        visual.fill = Some(SELECTION_FILL.to_string());
        visual.underline = None;
    }

    if attention.is_some_and(|range| range.contains(index)) {
        visual.pulse = true;
    }

    visual
}
