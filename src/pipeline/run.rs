//! The study pipeline and its `run` operation.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use sage_search::orchestrator;
use sage_search::{
    CandidateFailure, Fetcher, LexicalScorer, Query, Scorer, SearchError, Source, SourceAdapter,
    SourceFailure,
};

use super::{RunError, RunReport, StudyItem};
use crate::config::SageConfig;
use crate::error::SageError;
use crate::knowledge::{
    HistoryEntry, KnowledgeDelta, KnowledgeEntry, KnowledgeStore, RunOutcome, RunRecord,
    normalize_topic,
};
use crate::summarize::{OpenAiSummarizer, RetryPolicy, Summarizer, summarize_with_retry};

/// Everything a run learned while holding the topic lock.
#[derive(Debug, Default)]
struct Studied {
    items: Vec<StudyItem>,
    source_failures: Vec<SourceFailure>,
    candidate_failures: Vec<CandidateFailure>,
    deadline_hit: bool,
    /// Why nothing usable came out, if so.
    failure: Option<String>,
}

impl Studied {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Retrieves, summarizes and records study material for a topic.
pub struct StudyPipeline<A, S, Z> {
    config: SageConfig,
    adapters: Vec<A>,
    fetcher: Fetcher,
    scorer: S,
    summarizer: Z,
    store: Arc<KnowledgeStore>,
    cancel: CancellationToken,
}

impl StudyPipeline<Source, LexicalScorer, OpenAiSummarizer> {
    /// Build the default pipeline: configured sources, lexical scoring and
    /// the OpenAI-compatible summarizer.
    ///
    /// # Errors
    ///
    /// Returns [`SageError::Config`] for invalid settings and
    /// [`SageError::Search`] if the HTTP client cannot be built.
    pub fn from_config(config: SageConfig, store: Arc<KnowledgeStore>) -> Result<Self, SageError> {
        config.validate()?;
        let adapters = Source::registry(&config.search);
        let fetcher = Fetcher::new(&config.search)?;
        let summarizer = OpenAiSummarizer::from_config(&config.summarizer)
            .map_err(|e| SageError::Config(e.to_string()))?;
        Ok(Self::new(
            config,
            adapters,
            fetcher,
            LexicalScorer,
            summarizer,
            store,
        ))
    }
}

impl<A, S, Z> StudyPipeline<A, S, Z>
where
    A: SourceAdapter,
    S: Scorer,
    Z: Summarizer,
{
    /// Assemble a pipeline from explicit parts.
    pub fn new(
        config: SageConfig,
        adapters: Vec<A>,
        fetcher: Fetcher,
        scorer: S,
        summarizer: Z,
        store: Arc<KnowledgeStore>,
    ) -> Self {
        Self {
            config,
            adapters,
            fetcher,
            scorer,
            summarizer,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` instead of the pipeline's own token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels in-flight runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The knowledge store this pipeline writes to.
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Study `topic` and return up to `requested_count` summarized results.
    ///
    /// The topic lock is held from the first read of the entry until this
    /// run's merge is committed, so concurrent runs on one topic apply in
    /// sequence. Every finished run, failed or not, leaves one audit record;
    /// a cancelled run leaves none.
    ///
    /// # Errors
    ///
    /// - [`RunError::InvalidQuery`] for a blank topic, a zero count or
    ///   invalid search settings.
    /// - [`RunError::NoUsableCandidates`] if every source failed or nothing
    ///   survived fetching, ranking and summarization.
    /// - [`RunError::Cancelled`] if the pipeline's token fired before the merge.
    /// - [`RunError::Knowledge`] if the store could not be read or written.
    pub async fn run(&self, topic: &str, requested_count: usize) -> Result<RunReport, RunError> {
        let topic = self.store.resolve_topic(topic).await?;
        let query = Query::new(topic.clone(), requested_count)
            .map_err(|e| RunError::InvalidQuery(e.to_string()))?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, requested_count, "run started");
        tracing::trace!(run_id = %run_id, topic = %topic, "run topic");

        let outcome = self
            .store
            .with_topic_lock(&topic, |entry| self.study(&query, &run_id, entry))
            .await;
        let ended_at = Utc::now();

        let (studied, knowledge_after) = match outcome {
            Ok(done) => done,
            Err(RunError::Cancelled) => {
                tracing::info!(run_id = %run_id, "run cancelled, nothing recorded");
                return Err(RunError::Cancelled);
            }
            Err(err) => {
                let record = RunRecord {
                    run_id: run_id.clone(),
                    topic: topic.clone(),
                    requested_count,
                    started_at,
                    ended_at,
                    outcome: RunOutcome::Failed(err.to_string()),
                    selected_urls: Vec::new(),
                    source_failures: Vec::new(),
                    candidate_failures: Vec::new(),
                };
                if let Err(audit_err) = self.store.record_run(record).await {
                    tracing::warn!(run_id = %run_id, error = %audit_err, "failed to record run");
                }
                return Err(err);
            }
        };

        let record = RunRecord {
            run_id: run_id.clone(),
            topic: topic.clone(),
            requested_count,
            started_at,
            ended_at,
            outcome: match &studied.failure {
                Some(reason) => RunOutcome::Failed(reason.clone()),
                None => RunOutcome::Succeeded,
            },
            selected_urls: studied
                .items
                .iter()
                .map(|item| item.result.document.canonical_url.clone())
                .collect(),
            source_failures: studied.source_failures.clone(),
            candidate_failures: studied.candidate_failures.clone(),
        };
        self.store.record_run(record).await?;

        if let Some(reason) = studied.failure {
            tracing::warn!(run_id = %run_id, reason = %reason, "run produced nothing");
            return Err(RunError::NoUsableCandidates(reason));
        }

        tracing::info!(
            run_id = %run_id,
            selected = studied.items.len(),
            source_failures = studied.source_failures.len(),
            candidate_failures = studied.candidate_failures.len(),
            mastery = %knowledge_after.mastery_level,
            "run complete"
        );

        Ok(RunReport {
            run_id,
            topic,
            requested_count,
            started_at,
            ended_at,
            selected: studied.items,
            knowledge_after,
            source_failures: studied.source_failures,
            candidate_failures: studied.candidate_failures,
            deadline_hit: studied.deadline_hit,
        })
    }

    /// Retrieve and summarize under the topic lock; returns the delta to merge.
    async fn study(
        &self,
        query: &Query,
        run_id: &str,
        entry: KnowledgeEntry,
    ) -> Result<(Studied, Option<KnowledgeDelta>), RunError> {
        let run_deadline = Instant::now() + self.config.pipeline.run_timeout();
        let retrieval = match orchestrator::retrieve(
            query,
            &self.adapters,
            &self.fetcher,
            &self.scorer,
            &self.config.search,
            run_deadline,
            &self.cancel,
        )
        .await
        {
            Ok(retrieval) => retrieval,
            Err(SearchError::Cancelled(_)) => return Err(RunError::Cancelled),
            Err(SearchError::Config(reason)) => return Err(RunError::InvalidQuery(reason)),
            Err(err) => return Ok((Studied::failed(err.to_string()), None)),
        };

        let mut studied = Studied {
            items: Vec::new(),
            source_failures: retrieval.source_failures,
            candidate_failures: retrieval.candidate_failures,
            deadline_hit: retrieval.deadline_hit,
            failure: None,
        };
        if retrieval.selected.is_empty() {
            studied.failure = Some(format!(
                "none of {} candidates survived fetching",
                retrieval.candidate_count
            ));
            return Ok((studied, None));
        }

        let policy = RetryPolicy::from_config(&self.config.summarizer);
        let target = entry.mastery_level;
        let max_chars = self.config.pipeline.summary_max_chars;
        let summaries = join_all(retrieval.selected.iter().map(|result| {
            let text = truncate_chars(&result.document.normalized_text, max_chars);
            summarize_with_retry(&self.summarizer, text, query.topic(), target, &policy)
        }));
        let summaries = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(RunError::Cancelled),
            summaries = summaries => summaries,
        };

        for (result, summary) in retrieval.selected.into_iter().zip(summaries) {
            match summary {
                Ok(summary) => studied.items.push(StudyItem { result, summary }),
                Err(err) => {
                    tracing::warn!(
                        source = %result.document.source,
                        url = %result.document.canonical_url,
                        error = %err,
                        "summarization failed, dropping result"
                    );
                    studied.candidate_failures.push(CandidateFailure {
                        source: result.document.source,
                        url: result.document.canonical_url,
                        reason: format!("summarization failed: {err}"),
                    });
                }
            }
        }

        if studied.items.is_empty() {
            studied.failure = Some("every selected document failed summarization".into());
            return Ok((studied, None));
        }
        if self.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let now = Utc::now();
        let mut delta = KnowledgeDelta::new(now);
        delta.new_subtopics = studied
            .items
            .iter()
            .map(|item| normalize_topic(&item.result.document.title))
            .filter(|title| !title.is_empty())
            .collect();
        let summary_ref = format!("summary-{run_id}");
        delta.history_entry = Some(HistoryEntry {
            run_id: run_id.to_owned(),
            timestamp: now,
            summary_ref,
        });
        delta.digest = Some(render_digest(query.topic(), &studied.items));

        Ok((studied, Some(delta)))
    }
}

/// Markdown digest stored for a run.
fn render_digest(topic: &str, items: &[StudyItem]) -> String {
    let mut digest = format!("# {topic}\n");
    for item in items {
        let document = &item.result.document;
        let label = if document.is_arxiv_abstract() {
            " (arXiv abstract)"
        } else {
            ""
        };
        digest.push_str(&format!(
            "\n## {}. {}{label}\n<{}>\n\n{}\n",
            item.result.rank, document.title, document.canonical_url, item.summary
        ));
    }
    digest
}

/// The first `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
