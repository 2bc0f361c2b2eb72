//! End-to-end study runs.
//!
//! One [`run`](StudyPipeline::run) takes a topic from retrieval through
//! summarization to a knowledge merge:
//!
//! ```text
//! resolve topic → lock topic → read entry → retrieve (broadcast, fetch,
//! dedupe, rank, select) → summarize → merge → unlock → audit
//! ```
//!
//! Cancellation at any point before the merge leaves the knowledge store
//! and the audit table untouched.

mod run;

pub use run::StudyPipeline;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sage_search::{CandidateFailure, RankedResult, SourceFailure};

use crate::knowledge::{KnowledgeEntry, KnowledgeError};

/// Run-level failures.
///
/// Per-source and per-candidate problems never surface here; they are
/// reported in [`RunReport`] and the audit record.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Nothing survived to the output.
    #[error("no usable candidates: {0}")]
    NoUsableCandidates(String),

    /// The run was cancelled before its merge.
    #[error("run cancelled")]
    Cancelled,

    #[error("knowledge store error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// Blank topic, zero count or unusable search settings.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A selected document with its summary.
#[derive(Debug, Clone, Serialize)]
pub struct StudyItem {
    /// Ranked document; `rank` is its position before summarization drops.
    pub result: RankedResult,
    pub summary: String,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub topic: String,
    pub requested_count: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// At most `requested_count` items, best first.
    pub selected: Vec<StudyItem>,
    /// The topic's entry after this run's merge.
    pub knowledge_after: KnowledgeEntry,
    pub source_failures: Vec<SourceFailure>,
    /// Candidates excluded before ranking or dropped after summarization failed.
    pub candidate_failures: Vec<CandidateFailure>,
    /// `true` if the run deadline cut fetching short.
    pub deadline_hit: bool,
}
