//! crates/marginalia_core/src/error.rs
//!
//! The engine-level error taxonomy. Each variant carries its own
//! propagation policy, documented on the type.

use crate::ports::PortError;

/// A network or HTTP failure on a read path (document, annotation list,
/// block range). Fatal when it hits the initial session open; a prefetch
/// failure is surfaced as a non-blocking notice and retried on the next
/// trigger.
#[derive(Debug, thiserror::Error)]
#[error("fetch failed: {0}")]
pub struct FetchError(#[from] pub PortError);

/// An annotation create, update or delete that was rejected or unreachable.
/// By the time this surfaces the optimistic local mutation has already been
/// rolled back, so visible state never diverges from what the backend
/// persisted. Toast-level, never fatal.
#[derive(Debug, thiserror::Error)]
#[error("annotation mutation failed: {0}")]
pub struct MutationError(#[from] pub PortError);

/// The user attempted a selection spanning two blocks. Surfaced as a
/// transient, dismissable notice; the selection machine has already reset
/// to idle with no partial state retained.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("selection cannot span blocks (started in {started_in}, clicked {clicked})")]
pub struct CrossBlockSelectionError {
    pub started_in: String,
    pub clicked: String,
}

/// Malformed word or style metadata on a block. Always recovered locally by
/// degrading the block to plain-text rendering; never surfaced to the user.
#[derive(Debug, thiserror::Error)]
#[error("malformed block metadata: {0}")]
pub struct ParseError(pub String);
