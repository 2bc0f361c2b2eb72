//! Concurrent broadcast of a query to every configured source.
//!
//! Each source runs under its own deadline, cut short by the run deadline
//! when that comes first. Failures and timeouts are logged and recorded but
//! never abort the broadcast; only "every source failed" is an error.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapter::SourceAdapter;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::{Query, RawCandidate, SourceFailure};

/// Candidates gathered from all sources, plus the sources that failed.
#[derive(Debug, Clone, Default)]
pub struct BroadcastOutcome {
    /// Candidates in source order, each source's own order preserved.
    pub candidates: Vec<RawCandidate>,
    /// Sources that returned an error or ran out of time.
    pub failures: Vec<SourceFailure>,
    /// `true` if the run deadline cut at least one source short.
    pub deadline_hit: bool,
}

/// Query every adapter concurrently, each bounded by
/// `config.broadcast_timeout()` or `run_deadline`, whichever is earlier.
/// Sources still pending at that point are recorded as timed out.
///
/// # Errors
///
/// - [`SearchError::Cancelled`] if `cancel` fires first.
/// - [`SearchError::AllSourcesFailed`] if every adapter failed. Adapters that
///   succeed with zero candidates are not failures.
pub async fn broadcast<A: SourceAdapter>(
    adapters: &[A],
    query: &Query,
    config: &SearchConfig,
    run_deadline: Instant,
    cancel: &CancellationToken,
) -> Result<BroadcastOutcome, SearchError> {
    let started = Instant::now();
    let source_deadline = (started + config.broadcast_timeout()).min(run_deadline);
    let cut_by_run = source_deadline == run_deadline;
    let allowed = source_deadline.saturating_duration_since(started);

    let futures: Vec<_> = adapters
        .iter()
        .map(|adapter| async move {
            let pending = adapter.broadcast(query, config);
            let result = match tokio::time::timeout_at(source_deadline, pending).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::SourceTimeout {
                    kind: adapter.kind(),
                    elapsed_ms: u64::try_from(allowed.as_millis()).unwrap_or(u64::MAX),
                }),
            };
            (adapter.kind(), result)
        })
        .collect();

    let outcomes = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Err(SearchError::Cancelled("broadcast abandoned".into()));
        }
        outcomes = futures::future::join_all(futures) => outcomes,
    };

    let mut outcome = BroadcastOutcome::default();
    let mut succeeded = 0usize;

    for (source, result) in outcomes {
        match result {
            Ok(candidates) => {
                let count = candidates.len();
                tracing::debug!(%source, count, "source returned candidates");
                succeeded += 1;
                outcome.candidates.extend(candidates);
            }
            Err(err) => {
                tracing::warn!(source = %source, error = %err, "source query failed");
                if cut_by_run && matches!(err, SearchError::SourceTimeout { .. }) {
                    outcome.deadline_hit = true;
                }
                outcome.failures.push(SourceFailure {
                    source,
                    reason: err.to_string(),
                });
            }
        }
    }

    if succeeded == 0 && !outcome.failures.is_empty() {
        let summary = outcome
            .failures
            .iter()
            .map(|f| f.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SearchError::AllSourcesFailed(summary));
    }

    Ok(outcome)
}
