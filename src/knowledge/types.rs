//! Knowledge entry types and the pure merge rule.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sage_search::{CandidateFailure, SourceFailure};

/// Current schema version for the knowledge database.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// How well the user knows a topic. Ordered: only ever raised.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl MasteryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MasteryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown mastery level: {other}")),
        }
    }
}

/// One study run recorded against a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    /// Id of the stored digest for this run.
    pub summary_ref: String,
}

/// Everything the store tracks for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Display form of the topic.
    pub topic: String,
    pub mastery_level: MasteryLevel,
    pub covered_subtopics: BTreeSet<String>,
    /// `None` until the first write.
    pub last_updated: Option<DateTime<Utc>>,
    /// Ordered by timestamp, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Number of committed writes; 0 for a topic never written.
    pub revision: u64,
}

impl KnowledgeEntry {
    /// The entry returned for a topic that has never been written.
    pub fn empty(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            mastery_level: MasteryLevel::Beginner,
            covered_subtopics: BTreeSet::new(),
            last_updated: None,
            history: Vec::new(),
            revision: 0,
        }
    }

    /// `true` if the entry has never been written.
    pub fn is_new(&self) -> bool {
        self.revision == 0
    }
}

/// Changes a run wants to apply to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDelta {
    pub new_subtopics: BTreeSet<String>,
    /// Explicit mastery observation; may be lower than the stored level.
    pub mastery_observation: Option<MasteryLevel>,
    pub history_entry: Option<HistoryEntry>,
    /// Digest text stored under `history_entry.summary_ref`.
    pub digest: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl KnowledgeDelta {
    /// An empty delta observed at `observed_at`.
    pub fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            new_subtopics: BTreeSet::new(),
            mastery_observation: None,
            history_entry: None,
            digest: None,
            observed_at,
        }
    }
}

/// Coverage thresholds that turn a subtopic count into a mastery observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasteryPolicy {
    pub intermediate_after: usize,
    pub advanced_after: usize,
}

impl Default for MasteryPolicy {
    fn default() -> Self {
        Self {
            intermediate_after: 5,
            advanced_after: 15,
        }
    }
}

impl MasteryPolicy {
    /// Mastery implied by having covered `subtopic_count` subtopics.
    pub fn observe(&self, subtopic_count: usize) -> MasteryLevel {
        if subtopic_count >= self.advanced_after {
            MasteryLevel::Advanced
        } else if subtopic_count >= self.intermediate_after {
            MasteryLevel::Intermediate
        } else {
            MasteryLevel::Beginner
        }
    }
}

/// Apply `delta` to `entry`.
///
/// Subtopics are unioned, mastery never decreases and history only grows:
/// a new history entry is placed after every entry with an earlier or equal
/// timestamp, and a run id already present is not added twice. Merging two
/// deltas in either order yields the same entry.
pub fn merge(
    entry: &KnowledgeEntry,
    delta: &KnowledgeDelta,
    policy: &MasteryPolicy,
) -> KnowledgeEntry {
    let mut merged = entry.clone();

    merged
        .covered_subtopics
        .extend(delta.new_subtopics.iter().cloned());

    let observed = policy.observe(merged.covered_subtopics.len());
    merged.mastery_level = merged
        .mastery_level
        .max(observed)
        .max(delta.mastery_observation.unwrap_or_default());

    if let Some(item) = &delta.history_entry {
        let seen = merged.history.iter().any(|h| h.run_id == item.run_id);
        if !seen {
            let at = merged
                .history
                .partition_point(|h| (h.timestamp, &h.run_id) <= (item.timestamp, &item.run_id));
            merged.history.insert(at, item.clone());
        }
    }

    merged.last_updated = Some(match merged.last_updated {
        Some(previous) => previous.max(delta.observed_at),
        None => delta.observed_at,
    });
    merged.revision = entry.revision + 1;
    merged
}

/// Trim a raw topic and collapse inner whitespace.
pub fn normalize_topic(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive storage key for a topic.
pub fn topic_key(raw: &str) -> String {
    normalize_topic(raw).to_lowercase()
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Append-only audit record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub topic: String,
    pub requested_count: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub selected_urls: Vec<String>,
    #[serde(default)]
    pub source_failures: Vec<SourceFailure>,
    /// Candidates excluded before ranking or dropped after summarization failed.
    #[serde(default)]
    pub candidate_failures: Vec<CandidateFailure>,
}
