//! Trait definition for pluggable source adapters.
//!
//! Each provider (arXiv, Brave, Hacker News, ...) implements
//! [`SourceAdapter`] to turn a [`Query`] into [`RawCandidate`]s.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::{Query, RawCandidate, SourceKind};

/// A provider of candidate documents.
///
/// Implementors handle their own query translation, pagination, HTTP
/// request and response parsing. A failing adapter reports
/// [`SearchError::SourceUnavailable`]; it never aborts a run. The
/// per-source deadline (`config.broadcast_timeout()`) is enforced by the
/// orchestrator, which reports overruns as [`SearchError::SourceTimeout`].
///
/// All implementations must be `Send + Sync` for concurrent broadcast.
pub trait SourceAdapter: Send + Sync {
    /// Ask this source for up to `config.per_source_limit` candidates.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the source cannot be queried or its
    /// response cannot be parsed.
    fn broadcast(
        &self,
        query: &Query,
        config: &SearchConfig,
    ) -> impl std::future::Future<Output = Result<Vec<RawCandidate>, SearchError>> + Send;

    /// Returns which [`SourceKind`] this implementation represents.
    fn kind(&self) -> SourceKind;
}
