//! # sage-search
//!
//! Federated retrieval of study material for a topic.
//!
//! A query is broadcast to several independent, unreliable sources at once;
//! the candidates they return are fetched and cleaned, collapsed by
//! canonical URL, ranked against the topic and cut to the number the caller
//! asked for.
//!
//! ## Design
//!
//! - Fixed source registry (arXiv, Brave web/news, Hacker News, X / Twitter
//!   and Substack via Brave `site:` filters) resolved from config
//! - Each source under its own deadline; a failing source never aborts a run
//! - Bounded fetch fan-out with per-fetch timeouts and a run deadline
//! - PDF references rewritten to abstract pages; binary content never parsed
//! - Deterministic ranking: epsilon tie groups, then length, then URL
//! - In-memory document cache with configurable TTL
//!
//! ## Security
//!
//! - API keys never appear in errors or logs
//! - Topics are logged only at trace level

pub mod adapter;
pub mod adapters;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod http;
pub mod orchestrator;
pub mod types;

pub use adapter::SourceAdapter;
pub use adapters::Source;
pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use fetch::Fetcher;
pub use orchestrator::ranking::{LexicalScorer, Scorer, ScoringUnavailable};
pub use orchestrator::url_normalize::CanonicalKey;
pub use orchestrator::Retrieval;
pub use types::{
    CandidateFailure, FetchStatus, FetchedDocument, Query, RankedResult, RawCandidate,
    SourceFailure, SourceKind,
};

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Retrieve study material for `query` from the configured sources.
///
/// Convenience wrapper around [`orchestrator::retrieve`] using the built-in
/// source registry, a fresh [`Fetcher`] and `overall_timeout` as the run
/// deadline.
///
/// # Errors
///
/// Same as [`orchestrator::retrieve`], plus [`SearchError::Http`] if the
/// HTTP client cannot be built.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> sage_search::Result<()> {
/// use std::time::Duration;
///
/// let config = sage_search::SearchConfig::default();
/// let query = sage_search::Query::new("graph neural networks", 5)?;
/// let retrieval = sage_search::retrieve(
///     &query,
///     &config,
///     &sage_search::LexicalScorer,
///     Duration::from_secs(60),
///     &tokio_util::sync::CancellationToken::new(),
/// )
/// .await?;
/// for result in &retrieval.selected {
///     println!("{}. {}", result.rank, result.document.canonical_url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn retrieve<S: Scorer>(
    query: &Query,
    config: &SearchConfig,
    scorer: &S,
    overall_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Retrieval> {
    config.validate()?;
    let sources = Source::registry(config);
    let fetcher = Fetcher::new(config)?;
    orchestrator::retrieve(
        query,
        &sources,
        &fetcher,
        scorer,
        config,
        Instant::now() + overall_timeout,
        cancel,
    )
    .await
}
