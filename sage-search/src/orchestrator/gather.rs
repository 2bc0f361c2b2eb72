//! Bounded fan-out fetch with a fan-in barrier.
//!
//! At most `fetch_concurrency` fetches are in flight. Each fetch carries
//! its own timeout; the whole gather stops at the run deadline, keeping
//! whatever finished. Results are published in candidate order no matter
//! which fetch completed first.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::fetch::Fetcher;
use crate::types::{FetchedDocument, RawCandidate};

/// Reason recorded for candidates whose fetch never finished.
pub const ABANDONED_AT_DEADLINE: &str = "abandoned at run deadline";

/// Everything the gather produced.
#[derive(Debug, Clone, Default)]
pub struct GatherOutcome {
    /// One document per distinct fetch target, in candidate order.
    pub documents: Vec<FetchedDocument>,
    /// `true` if the run deadline cut the gather short.
    pub deadline_hit: bool,
}

/// Fetch every candidate, bounded by `config.fetch_concurrency`.
///
/// Candidates with an identical URL are fetched once (the first occurrence
/// wins). When `run_deadline` passes, in-flight fetches are dropped and
/// their candidates recorded as failed.
///
/// # Errors
///
/// Returns [`SearchError::Cancelled`] if `cancel` fires; in-flight fetches
/// are dropped and nothing is returned.
pub async fn gather(
    fetcher: &Fetcher,
    candidates: Vec<RawCandidate>,
    config: &SearchConfig,
    run_deadline: Instant,
    cancel: &CancellationToken,
) -> Result<GatherOutcome, SearchError> {
    let mut seen = HashSet::new();
    let unique: Vec<RawCandidate> = candidates
        .into_iter()
        .filter(|c| seen.insert(c.canonical_url.clone()))
        .collect();

    let fetch_timeout = config.fetch_timeout();
    let mut slots: Vec<Option<FetchedDocument>> = vec![None; unique.len()];

    let mut in_flight = stream::iter(unique.iter().enumerate())
        .map(|(idx, candidate)| async move {
            let document = match tokio::time::timeout(fetch_timeout, fetcher.fetch(candidate)).await
            {
                Ok(document) => document,
                Err(_) => FetchedDocument::failed(
                    candidate,
                    &candidate.canonical_url,
                    format!("timed out after {}ms", fetch_timeout.as_millis()),
                ),
            };
            (idx, document)
        })
        .buffer_unordered(config.fetch_concurrency);

    let deadline = tokio::time::sleep_until(run_deadline);
    tokio::pin!(deadline);
    let mut deadline_hit = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("fetch fan-out cancelled");
                return Err(SearchError::Cancelled("fetches abandoned".into()));
            }
            () = &mut deadline => {
                deadline_hit = true;
                break;
            }
            next = in_flight.next() => match next {
                Some((idx, document)) => slots[idx] = Some(document),
                None => break,
            },
        }
    }
    drop(in_flight);

    let finished = slots.iter().filter(|s| s.is_some()).count();
    if deadline_hit {
        tracing::warn!(
            finished,
            total = unique.len(),
            "run deadline reached, continuing with completed fetches"
        );
    } else {
        tracing::debug!(finished, "all fetches complete");
    }

    let documents = unique
        .iter()
        .zip(slots)
        .map(|(candidate, slot)| {
            slot.unwrap_or_else(|| {
                FetchedDocument::failed(candidate, &candidate.canonical_url, ABANDONED_AT_DEADLINE)
            })
        })
        .collect();

    Ok(GatherOutcome {
        documents,
        deadline_hit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FetchStatus, SourceKind};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(words: usize) -> ResponseTemplate {
        let body = format!("<html><body><article>{}</article></body></html>", "word ".repeat(words));
        ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
    }

    fn candidate(url: String) -> RawCandidate {
        RawCandidate {
            source: SourceKind::BraveWeb,
            canonical_url: url.clone(),
            title: "t".into(),
            raw_reference: url,
            snippet: String::new(),
            published: None,
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            min_chars: 50,
            fetch_concurrency: 2,
            fetch_timeout_seconds: 5,
            cache_ttl_seconds: 0,
            ..Default::default()
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn publishes_in_candidate_order_regardless_of_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(page(40).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(page(40))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/short"))
            .respond_with(page(2))
            .mount(&server)
            .await;

        let config = config();
        let fetcher = Fetcher::new(&config).expect("fetcher");
        let candidates = vec![
            candidate(format!("{}/slow", server.uri())),
            candidate(format!("{}/fast", server.uri())),
            candidate(format!("{}/short", server.uri())),
            candidate(format!("{}/fast", server.uri())),
        ];
        let outcome = gather(&fetcher, candidates, &config, far_deadline(), &CancellationToken::new())
            .await
            .expect("gather");

        assert!(!outcome.deadline_hit);
        let urls: Vec<String> = outcome.documents.iter().map(|d| d.canonical_url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}/slow", server.uri()),
                format!("{}/fast", server.uri()),
                format!("{}/short", server.uri()),
            ]
        );
        assert_eq!(outcome.documents[2].fetch_status, FetchStatus::TooShort);
    }

    #[tokio::test]
    async fn per_fetch_timeout_marks_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(page(40).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let config = SearchConfig {
            fetch_timeout_seconds: 1,
            ..config()
        };
        let fetcher = Fetcher::new(&config).expect("fetcher");
        let outcome = gather(
            &fetcher,
            vec![candidate(server.uri())],
            &config,
            far_deadline(),
            &CancellationToken::new(),
        )
        .await
        .expect("gather");
        assert!(matches!(
            outcome.documents[0].fetch_status,
            FetchStatus::FetchFailed(_)
        ));
    }

    #[tokio::test]
    async fn run_deadline_keeps_completed_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quick"))
            .respond_with(page(40))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stuck"))
            .respond_with(page(40).set_delay(Duration::from_secs(4)))
            .mount(&server)
            .await;

        let config = config();
        let fetcher = Fetcher::new(&config).expect("fetcher");
        let candidates = vec![
            candidate(format!("{}/quick", server.uri())),
            candidate(format!("{}/stuck", server.uri())),
        ];
        let deadline = Instant::now() + Duration::from_millis(800);
        let outcome = gather(&fetcher, candidates, &config, deadline, &CancellationToken::new())
            .await
            .expect("gather");

        assert!(outcome.deadline_hit);
        assert_eq!(outcome.documents[0].fetch_status, FetchStatus::Ok);
        assert_eq!(
            outcome.documents[1].fetch_status,
            FetchStatus::FetchFailed(ABANDONED_AT_DEADLINE.into())
        );
    }

    #[tokio::test]
    async fn cancellation_returns_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(page(40).set_delay(Duration::from_secs(4)))
            .mount(&server)
            .await;

        let config = config();
        let fetcher = Fetcher::new(&config).expect("fetcher");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = gather(&fetcher, vec![candidate(server.uri())], &config, far_deadline(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled(_)));
    }

    #[tokio::test]
    async fn no_candidates_is_empty_outcome() {
        let config = config();
        let fetcher = Fetcher::new(&config).expect("fetcher");
        let outcome = gather(&fetcher, vec![], &config, far_deadline(), &CancellationToken::new())
            .await
            .expect("gather");
        assert!(outcome.documents.is_empty());
    }
}
