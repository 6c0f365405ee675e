//! The annotation & selection engine for a paginated, word-tokenized
//! document reader.
//!
//! The engine keeps stable token identity across asynchronous, out-of-order
//! page loads, turns two-click sequences into committed word ranges, overlays
//! annotations onto tokens with deterministic overlap precedence, and
//! reconciles optimistic local edits with an authoritative backend reached
//! through the [`ports::BackendService`] seam.

pub mod domain;
pub mod error;
pub mod loader;
pub mod ports;
pub mod render;
pub mod selection;
pub mod session;
pub mod store;
pub mod token;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testutil;

pub use domain::{
    Annotation, AnnotationAttrs, AnnotationDraft, AnnotationPatch, Block, BlockContent, Document,
    FontStyle, ReadingSession, ReadingStats, TocEntry, Word, WordRange, WordStyle,
};
pub use error::{CrossBlockSelectionError, FetchError, MutationError, ParseError};
pub use ports::{BackendService, PortError, PortResult};
pub use render::TokenVisual;
pub use selection::{ClickOutcome, CommitIntent, SelectionState};
pub use session::ReaderSession;
pub use token::{TokenAddress, TokenIndex};
