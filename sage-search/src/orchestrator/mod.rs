//! Retrieval orchestrator: broadcast, gather, dedup, rank, select.
//!
//! [`retrieve`] runs the whole candidate lifecycle for one query. Source
//! and per-candidate failures are collected into the [`Retrieval`] rather
//! than surfaced as errors.

pub mod broadcast;
pub mod dedup;
pub mod gather;
pub mod ranking;
pub mod select;
pub mod url_normalize;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapter::SourceAdapter;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::fetch::Fetcher;
use crate::types::{CandidateFailure, Query, RankedResult, SourceFailure};

use self::ranking::Scorer;

/// Result of one retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// The top `requested_count` results, rank 1 first.
    pub selected: Vec<RankedResult>,
    /// How many distinct documents survived to ranking.
    pub ranked_count: usize,
    /// Number of candidates the sources returned.
    pub candidate_count: usize,
    /// Sources that failed or timed out.
    pub source_failures: Vec<SourceFailure>,
    /// Candidates excluded before ranking (too short, fetch failed, ...).
    pub candidate_failures: Vec<CandidateFailure>,
    /// `true` if the run deadline cut the broadcast or fetching short.
    pub deadline_hit: bool,
}

/// Run the candidate lifecycle for `query`: discover, fetch, dedupe, rank, select.
///
/// An empty [`Retrieval::selected`] means no candidate was usable; deciding
/// whether that is fatal is left to the caller.
///
/// # Errors
///
/// - [`SearchError::Config`] if `config` is invalid.
/// - [`SearchError::AllSourcesFailed`] if no source answered.
/// - [`SearchError::Cancelled`] if `cancel` fires before ranking starts.
pub async fn retrieve<A, S>(
    query: &Query,
    adapters: &[A],
    fetcher: &Fetcher,
    scorer: &S,
    config: &SearchConfig,
    run_deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Retrieval, SearchError>
where
    A: SourceAdapter,
    S: Scorer,
{
    config.validate()?;

    let broadcast = broadcast::broadcast(adapters, query, config, run_deadline, cancel).await?;
    let candidate_count = broadcast.candidates.len();
    tracing::info!(
        candidates = candidate_count,
        failed_sources = broadcast.failures.len(),
        "broadcast complete"
    );

    let gathered = gather::gather(fetcher, broadcast.candidates, config, run_deadline, cancel).await?;

    let mut candidate_failures = Vec::new();
    let mut usable = Vec::new();
    for document in gathered.documents {
        match CandidateFailure::from_document(&document) {
            Some(failure) => candidate_failures.push(failure),
            None => usable.push(document),
        }
    }

    let survivors = dedup::deduplicate(usable);
    let ranked_count = survivors.len();
    let ranked = ranking::rank(survivors, query.topic(), scorer, config.tie_epsilon).await;
    let selected = select::select(ranked, query.requested_count());

    tracing::info!(
        ranked = ranked_count,
        selected = selected.len(),
        excluded = candidate_failures.len(),
        "retrieval complete"
    );

    Ok(Retrieval {
        selected,
        ranked_count,
        candidate_count,
        source_failures: broadcast.failures,
        candidate_failures,
        deadline_hit: broadcast.deadline_hit || gathered.deadline_hit,
    })
}
