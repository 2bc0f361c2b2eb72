//! Error types for sage.

use crate::knowledge::KnowledgeError;
use crate::pipeline::RunError;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum SageError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Knowledge store error.
    #[error("knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// Retrieval error.
    #[error("search error: {0}")]
    Search(#[from] sage_search::SearchError),

    /// A run failed.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] RunError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_display() {
        let err = SageError::Config("max_retries too large".into());
        assert_eq!(err.to_string(), "config error: max_retries too large");
    }

    #[test]
    fn search_errors_convert() {
        let err: SageError = sage_search::SearchError::Config("bad".into()).into();
        assert_eq!(err.to_string(), "search error: config error: bad");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SageError>();
    }
}
