//! Error types for the sage-search crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No API keys or sensitive data appear in
//! error messages.

use crate::types::SourceKind;

/// Errors that can occur while retrieving study material.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A source could not be queried (missing credentials, HTTP failure,
    /// unparseable response). Non-fatal to a run.
    #[error("source unavailable: {kind}: {reason}")]
    SourceUnavailable {
        /// The source that failed.
        kind: SourceKind,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A source did not answer within its broadcast deadline. Non-fatal to a run.
    #[error("source timed out: {kind} after {elapsed_ms}ms")]
    SourceTimeout {
        /// The source that timed out.
        kind: SourceKind,
        /// Deadline that was exceeded, in milliseconds.
        elapsed_ms: u64,
    },

    /// Every configured source failed to return candidates.
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),

    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A provider response or document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration or query.
    #[error("config error: {0}")]
    Config(String),

    /// The operation was cancelled by the caller.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl SearchError {
    /// Shorthand for [`SearchError::SourceUnavailable`].
    pub fn unavailable(kind: SourceKind, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            kind,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for sage-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
