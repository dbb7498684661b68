//! Error types for quark-share-dl
//!
//! This module provides the error taxonomy of the library:
//! - [`Error`] for everything surfaced through the public API
//! - [`TransferError`] for the per-file failures of a batch transfer, which are
//!   isolated into a [`TransferOutcome`](crate::types::TransferOutcome) instead
//!   of aborting the batch

use thiserror::Error;

/// Result type alias for quark-share-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for quark-share-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The cloud API answered with a non-success status or without a payload.
    ///
    /// The message is the server's own text and is shown to the user verbatim.
    #[error("{message}")]
    Remote {
        /// Server-provided message (or a fallback when the server sent none)
        message: String,
    },

    /// A save task never became ready within the poll ceiling
    #[error("save task not ready after {attempts} poll attempts")]
    Timeout {
        /// Number of poll attempts made before giving up
        attempts: u32,
    },

    /// Local download or merge failure, opaque to the transfer core
    #[error("local I/O error: {0}")]
    LocalIo(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// The pasted share link could not be understood
    #[error("invalid share link: {0}")]
    InvalidShareLink(String),

    /// A batch is already running on this orchestrator
    #[error("a batch transfer is already in progress")]
    BatchInProgress,

    /// The operation was cancelled by the application
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Remote`] from an optional server message.
    ///
    /// Empty or missing messages are replaced by `fallback`.
    pub fn remote(message: Option<&str>, fallback: &str) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback);
        Error::Remote {
            message: message.to_string(),
        }
    }

    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Returns true if the error came from the cloud API (as opposed to local or transport issues)
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Remote { .. })
    }
}

/// Per-file transfer failures
///
/// Each variant maps to one step of the per-file workflow. None of them aborts
/// the batch; the orchestrator records them as a failed outcome and moves on.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Copying the shared file into the user's own storage failed
    #[error("save failed: {reason}")]
    SaveFailed {
        /// Why the save request was rejected
        reason: String,
    },

    /// The direct download URL could not be obtained for the saved copy
    #[error("resolving download link failed: {reason}")]
    ResolveFailed {
        /// Why the resolve request was rejected
        reason: String,
    },

    /// The local download of the resolved URL failed
    #[error("download failed: {reason}")]
    DownloadFailed {
        /// Why the local download failed
        reason: String,
    },
}
