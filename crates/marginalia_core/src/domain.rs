//! crates/marginalia_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reader engine.
//! These structs are independent of any wire format or storage backend.

use chrono::{DateTime, Utc};

/// The default highlight fill when a commit carries no explicit color.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ffeb3b";

/// Prefix of locally-minted annotation ids used while a create is in flight.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// A source document, as cached read-only for one reader session.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub total_pages: u32,
    pub theme: String,
    pub toc: Vec<TocEntry>,
}

/// One entry of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub level: u8,
    pub title: String,
    /// Zero-based target page.
    pub page: u32,
}

/// A contiguous unit of document content on one page.
///
/// Blocks are immutable once loaded. The only "mutation" is the backend
/// split operation, which returns two replacement blocks.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: String,
    pub doc_id: String,
    /// Zero-based page number.
    pub page_number: u32,
    /// Render order within the page.
    pub block_order: u32,
    pub content: BlockContent,
}

#[derive(Debug, Clone)]
pub enum BlockContent {
    Text { words: Vec<Word> },
    Image { path: String },
}

impl Block {
    /// The words of a text block; empty for image blocks.
    pub fn words(&self) -> &[Word] {
        match &self.content {
            BlockContent::Text { words } => words,
            BlockContent::Image { .. } => &[],
        }
    }

    pub fn word_count(&self) -> usize {
        self.words().len()
    }
}

/// A single word within a text block, addressed by its zero-based position.
/// Positions are never reused or renumbered after the block materializes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub text: String,
    pub style: WordStyle,
    /// A line break follows this word.
    pub newline: bool,
    /// Vertical offset of the break; only meaningful when `newline` is set.
    pub newline_offset: Option<f32>,
}

impl Word {
    /// Fallback tokenization for blocks whose word metadata failed to parse:
    /// whitespace-split words with no styling.
    pub fn plain_words(text: &str) -> Vec<Word> {
        text.split_whitespace()
            .map(|w| Word {
                text: w.to_string(),
                ..Word::default()
            })
            .collect()
    }
}

/// Optional style attributes carried by a word from the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordStyle {
    pub font_size: Option<f32>,
    pub font_family: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub color: Option<String>,
}

/// A half-open `[start, end)` interval over word indices within one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordRange {
    start: usize,
    end: usize,
}

impl WordRange {
    /// Builds a range, requiring `start < end`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Normalizes two clicked word indices, in either click order, into the
    /// committed range `[min, max + 1)`.
    pub fn from_clicks(a: usize, b: usize) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self {
            start: lo,
            end: hi + 1,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    /// Whether the range lies entirely within a block of `word_count` words.
    pub fn fits(&self, word_count: usize) -> bool {
        self.end <= word_count
    }
}

/// One of the font-style tags an annotation may carry.
///
/// The backend stores a single scalar; setting a new tag replaces the
/// previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Bold,
    Italic,
    Underline,
}

impl FontStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontStyle::Bold => "bold",
            FontStyle::Italic => "italic",
            FontStyle::Underline => "underline",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bold" => Some(FontStyle::Bold),
            "italic" => Some(FontStyle::Italic),
            "underline" => Some(FontStyle::Underline),
            _ => None,
        }
    }
}

/// A user-created annotation over a word range in one block.
///
/// The range and owning block are immutable post-creation; only color,
/// style and note may change through an update.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub id: String,
    pub doc_id: String,
    pub block_id: String,
    pub range: WordRange,
    pub color: String,
    pub font_size: Option<String>,
    pub font_style: Option<FontStyle>,
    pub note: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    /// Whether the annotation carries a non-empty note (drives the note
    /// indicator in rendering).
    pub fn has_note(&self) -> bool {
        self.note.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// True while the annotation only exists locally, awaiting the
    /// authoritative record from the backend.
    pub fn is_tentative(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// The user-chosen attributes carried by a commit (create or edit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationAttrs {
    pub color: Option<String>,
    pub font_size: Option<String>,
    pub font_style: Option<FontStyle>,
    pub note: Option<String>,
}

/// Request payload for creating an annotation.
#[derive(Debug, Clone)]
pub struct AnnotationDraft {
    pub doc_id: String,
    pub block_id: String,
    pub range: WordRange,
    pub color: String,
    pub font_size: Option<String>,
    pub font_style: Option<FontStyle>,
    pub note: Option<String>,
    pub user_id: String,
}

/// Partial update against an existing annotation. Range and block are
/// immutable post-creation and therefore absent here.
#[derive(Debug, Clone, Default)]
pub struct AnnotationPatch {
    pub color: Option<String>,
    pub font_size: Option<String>,
    pub font_style: Option<FontStyle>,
    pub note: Option<String>,
}

/// A reading-time tracking session, extended by periodic heartbeats and
/// closed by timeout on the collecting side.
#[derive(Debug, Clone)]
pub struct ReadingSession {
    pub id: String,
    pub document_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: u64,
}

/// Accumulated reading-time statistics for one document.
#[derive(Debug, Clone)]
pub struct ReadingStats {
    pub total_seconds: u64,
    pub total_sessions: u64,
    pub last_session_date: Option<DateTime<Utc>>,
}
