//! # Error Hierarchy
//!
//! Purpose: one error enum shared by every storage and protocol module so
//! callers never have to match on crate-specific error types.
//!
//! ## Design Principles
//! 1. **Single Enum**: every fallible operation in the workspace returns
//!    `ElysianResult<T>`.
//! 2. **Protocol-Shaped Variants**: variants map directly onto the text
//!    responses the TCP layer sends back (`NotFound` -> `Key not found`).
//! 3. **Fatal vs Retryable**: `Io` is retried by background tasks; `Fatal`
//!    aborts startup.

use std::io;
use std::path::PathBuf;

/// Result alias used across the workspace.
pub type ElysianResult<T> = Result<T, ElysianError>;

/// Errors surfaced by storage, snapshot, and protocol modules.
#[derive(Debug, thiserror::Error)]
pub enum ElysianError {
    /// Key is absent or has expired.
    #[error("key not found")]
    NotFound,

    /// A command line could not be parsed or used an unknown command.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Non-fatal I/O failure, e.g. a snapshot flush that can be retried.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Startup could not proceed; the process should exit non-zero.
    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl ElysianError {
    /// Wraps a fatal condition tied to a specific path for a clearer message.
    pub fn fatal_path(context: &str, path: &PathBuf, source: impl std::fmt::Display) -> Self {
        ElysianError::Fatal(format!("{context} ({}): {source}", path.display()))
    }
}
