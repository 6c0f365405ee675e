//! services/client/src/error.rs
//!
//! Defines the primary error type for the reader client.

use crate::config::ConfigError;
use marginalia_core::error::{FetchError, MutationError};
use marginalia_core::ports::PortError;

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service
    /// ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// A failed read on the document, block or annotation path.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// A rejected or unreachable annotation mutation.
    #[error("{0}")]
    Mutation(#[from] MutationError),

    /// Represents an error from the underlying HTTP client.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Represents a standard Input/Output error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
