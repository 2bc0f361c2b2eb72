//! Relevance ranking with a deterministic tie-break.
//!
//! Each document is scored against the topic by a [`Scorer`] and sorted by
//! score, descending. Consecutive documents whose scores lie within
//! `epsilon` of the first score of their run form a tie group, ordered by
//! `char_length` (descending) and then canonical URL (ascending). Documents
//! the scorer could not handle rank after every scored one.
//!
//! A score more than `epsilon` higher never shares a group with the lower
//! one, so it always ranks strictly earlier.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::future::Future;

use crate::types::{FetchedDocument, RankedResult};

/// Characters of document text the lexical scorer looks at.
const LEXICAL_WINDOW_CHARS: usize = 2000;

/// Weight of topic-term coverage in the lexical score; the rest is term frequency.
const COVERAGE_WEIGHT: f64 = 0.8;

/// The scorer could not produce a score for one document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scoring unavailable: {0}")]
pub struct ScoringUnavailable(pub String);

/// Relevance scorer: `(topic, document text) -> real`.
///
/// Higher is more relevant. A failure marks only that document as
/// unscored; it never aborts ranking.
pub trait Scorer: Send + Sync {
    /// Score `text` against `topic`.
    fn score(
        &self,
        topic: &str,
        text: &str,
    ) -> impl Future<Output = Result<f64, ScoringUnavailable>> + Send;
}

/// Token-overlap scorer in `[0, 1]` over the start of each document.
///
/// Used when no model-backed scorer is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl Scorer for LexicalScorer {
    async fn score(&self, topic: &str, text: &str) -> Result<f64, ScoringUnavailable> {
        lexical_score(topic, text)
    }
}

/// Score `text` by how many topic terms it contains and how often.
///
/// # Errors
///
/// Returns [`ScoringUnavailable`] if the topic has no usable terms.
pub fn lexical_score(topic: &str, text: &str) -> Result<f64, ScoringUnavailable> {
    let topic_tokens: HashSet<String> = tokenize(topic).into_iter().collect();
    if topic_tokens.is_empty() {
        return Err(ScoringUnavailable("topic has no searchable terms".into()));
    }

    let window: String = text.chars().take(LEXICAL_WINDOW_CHARS).collect();
    let text_tokens = tokenize(&window);

    let mut matched: HashSet<&str> = HashSet::new();
    let mut hits = 0usize;
    for token in &text_tokens {
        if topic_tokens.contains(token) {
            matched.insert(token.as_str());
            hits = hits.saturating_add(1);
        }
    }

    let coverage = matched.len() as f64 / topic_tokens.len() as f64;
    let saturation = (topic_tokens.len() * 5) as f64;
    let frequency = (hits as f64 / saturation).min(1.0);
    Ok(COVERAGE_WEIGHT * coverage + (1.0 - COVERAGE_WEIGHT) * frequency)
}

/// Lowercase alphanumeric tokens of two or more characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '\'' || ch == '-' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            if current.chars().count() > 1 {
                tokens.push(current.clone());
            }
            current.clear();
        }
    }
    if current.chars().count() > 1 {
        tokens.push(current);
    }

    tokens
}

/// Score every document and assign contiguous 1-based ranks.
///
/// Scoring runs concurrently; the resulting order depends only on scores,
/// lengths and URLs.
pub async fn rank<S: Scorer>(
    documents: Vec<FetchedDocument>,
    topic: &str,
    scorer: &S,
    epsilon: f64,
) -> Vec<RankedResult> {
    let scores = futures::future::join_all(
        documents
            .iter()
            .map(|doc| scorer.score(topic, &doc.normalized_text)),
    )
    .await;

    let mut scored: Vec<Scored> = documents
        .into_iter()
        .zip(scores)
        .map(|(doc, score)| {
            let score = match score {
                Ok(value) if value.is_finite() => Some(value),
                Ok(value) => {
                    tracing::debug!(url = %doc.canonical_url, value, "non-finite score treated as unscored");
                    None
                }
                Err(err) => {
                    tracing::debug!(url = %doc.canonical_url, error = %err, "document left unscored");
                    None
                }
            };
            (doc, score)
        })
        .collect();

    scored.sort_by(|a, b| by_score(a.1, b.1).then_with(|| tie_break(&a.0, &b.0)));

    let mut groups: Vec<Vec<Scored>> = Vec::new();
    for item in scored {
        match groups.last_mut() {
            Some(group) if same_tier(group[0].1, item.1, epsilon) => group.push(item),
            _ => groups.push(vec![item]),
        }
    }

    groups
        .into_iter()
        .flat_map(|mut group| {
            group.sort_by(|a, b| tie_break(&a.0, &b.0));
            group
        })
        .enumerate()
        .map(|(idx, (document, score))| RankedResult {
            document,
            score,
            rank: idx + 1,
        })
        .collect()
}

type Scored = (FetchedDocument, Option<f64>);

/// Higher scores first; unscored last. Scores are finite here.
fn by_score(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Whether `score` ties with the group opened by `head`.
fn same_tier(head: Option<f64>, score: Option<f64>, epsilon: f64) -> bool {
    match (head, score) {
        (Some(head), Some(score)) => head - score <= epsilon,
        (None, None) => true,
        _ => false,
    }
}

fn tie_break(a: &FetchedDocument, b: &FetchedDocument) -> Ordering {
    b.char_length
        .cmp(&a.char_length)
        .then_with(|| a.canonical_url.cmp(&b.canonical_url))
        .then_with(|| a.key.cmp(&b.key))
}
