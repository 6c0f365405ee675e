//! services/client/src/lib.rs
//!
//! The concrete side of the reader: an HTTP adapter implementing the core's
//! `BackendService` port, configuration loading, and the error type shared
//! with the binary.

pub mod adapters;
pub mod config;
pub mod error;
