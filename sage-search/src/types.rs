//! Core types for queries, candidates, fetched documents and ranked results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SearchError;
use crate::orchestrator::url_normalize::CanonicalKey;

/// Immutable input to a single retrieval run.
///
/// `requested_count` is always explicit; there is no default that could
/// silently diverge from what the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    topic: String,
    requested_count: usize,
}

impl Query {
    /// Build a query, rejecting a blank topic or a zero count.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the topic is empty after trimming
    /// or `requested_count` is zero.
    pub fn new(topic: impl Into<String>, requested_count: usize) -> Result<Self, SearchError> {
        let topic = topic.into();
        let trimmed = topic.trim();
        if trimmed.is_empty() {
            return Err(SearchError::Config("topic must not be empty".into()));
        }
        if requested_count == 0 {
            return Err(SearchError::Config(
                "requested_count must be at least 1".into(),
            ));
        }
        Ok(Self {
            topic: trimmed.to_owned(),
            requested_count,
        })
    }

    /// The topic being studied.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// How many results the caller asked for.
    pub fn requested_count(&self) -> usize {
        self.requested_count
    }
}

/// External providers a run can broadcast to.
///
/// This is a closed set resolved at startup; there is no string-keyed
/// adapter lookup at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// arXiv Atom API (academic papers).
    Arxiv,
    /// Brave Search web results.
    BraveWeb,
    /// Brave Search news results.
    BraveNews,
    /// Hacker News stories via the Algolia API.
    #[serde(rename = "hackernews")]
    HackerNews,
    /// X / Twitter posts surfaced through Brave with a `site:` filter.
    Twitter,
    /// Substack posts surfaced through Brave with a `site:` filter.
    Substack,
}

impl SourceKind {
    /// Stable identifier used in config files, logs and audit records.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::BraveWeb => "brave_web",
            Self::BraveNews => "brave_news",
            Self::HackerNews => "hackernews",
            Self::Twitter => "twitter",
            Self::Substack => "substack",
        }
    }

    /// Human-readable provider name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arxiv => "arXiv",
            Self::BraveWeb => "Brave Web",
            Self::BraveNews => "Brave News",
            Self::HackerNews => "Hacker News",
            Self::Twitter => "X / Twitter",
            Self::Substack => "Substack",
        }
    }

    /// Returns all available source variants.
    pub fn all() -> &'static [SourceKind] {
        &[
            Self::Arxiv,
            Self::BraveWeb,
            Self::BraveNews,
            Self::HackerNews,
            Self::Twitter,
            Self::Substack,
        ]
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A reference to a candidate document, as returned by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// Which source produced this candidate.
    pub source: SourceKind,
    /// Cleaned absolute URL of the candidate.
    pub canonical_url: String,
    /// Title as reported by the provider.
    pub title: String,
    /// The reference exactly as the provider returned it (href, Atom id, ...).
    pub raw_reference: String,
    /// Provider snippet, if any.
    #[serde(default)]
    pub snippet: String,
    /// Provider timestamp, if any (free-form; providers disagree on format).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

/// Outcome of fetching a single candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FetchStatus {
    /// Fetched and cleaned; long enough to rank.
    Ok,
    /// Cleaned text was shorter than the configured minimum.
    TooShort,
    /// A binary/PDF reference was rewritten to its abstract page before fetching.
    RedirectApplied,
    /// Transport or parse failure.
    FetchFailed(String),
}

impl FetchStatus {
    /// Returns `true` for statuses whose documents may be ranked and summarised.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Ok | Self::RedirectApplied)
    }
}

/// A candidate after fetching and normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedDocument {
    /// Source that produced the underlying candidate.
    pub source: SourceKind,
    /// The URL the content was actually retrieved from.
    pub canonical_url: String,
    /// Deduplication identity.
    pub key: CanonicalKey,
    /// Page title (provider title when the page has none).
    pub title: String,
    /// Clean text; empty unless `fetch_status` is usable.
    pub normalized_text: String,
    /// Length of the cleaned text in Unicode scalar values.
    pub char_length: usize,
    /// How the fetch went.
    pub fetch_status: FetchStatus,
}

impl FetchedDocument {
    /// Returns `true` if this document may be ranked and summarised.
    pub fn is_usable(&self) -> bool {
        self.fetch_status.is_usable() && !self.normalized_text.is_empty()
    }

    /// Returns `true` if the fetched page is an arXiv abstract page.
    pub fn is_arxiv_abstract(&self) -> bool {
        self.canonical_url.contains("arxiv.org/abs/")
    }

    /// Build a failed document for `candidate`.
    pub fn failed(candidate: &RawCandidate, target: &str, reason: impl Into<String>) -> Self {
        Self {
            source: candidate.source,
            canonical_url: target.to_owned(),
            key: CanonicalKey::from_url(target),
            title: candidate.title.clone(),
            normalized_text: String::new(),
            char_length: 0,
            fetch_status: FetchStatus::FetchFailed(reason.into()),
        }
    }
}

/// A document with its relevance score and final position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// The ranked document.
    pub document: FetchedDocument,
    /// Relevance to the topic; `None` when the scorer was unavailable.
    pub score: Option<f64>,
    /// 1-based position after tie-breaking.
    pub rank: usize,
}

/// A source that produced no candidates in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    /// The failing source.
    pub source: SourceKind,
    /// Why it failed (timeout, missing key, HTTP error, ...).
    pub reason: String,
}

/// A candidate that was excluded before ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFailure {
    /// Source that produced the candidate.
    pub source: SourceKind,
    /// URL the fetch targeted.
    pub url: String,
    /// Why the candidate was excluded.
    pub reason: String,
}

impl CandidateFailure {
    /// Describe why `document` cannot be ranked, or `None` if it can.
    pub fn from_document(document: &FetchedDocument) -> Option<Self> {
        let reason = match &document.fetch_status {
            FetchStatus::Ok | FetchStatus::RedirectApplied if document.is_usable() => return None,
            FetchStatus::Ok | FetchStatus::RedirectApplied => "empty document".to_owned(),
            FetchStatus::TooShort => format!("too short ({} chars)", document.char_length),
            FetchStatus::FetchFailed(reason) => format!("fetch failed: {reason}"),
        };
        Some(Self {
            source: document.source,
            url: document.canonical_url.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_trims_topic() {
        let query = Query::new("  graph neural networks ", 5).expect("valid query");
        assert_eq!(query.topic(), "graph neural networks");
        assert_eq!(query.requested_count(), 5);
    }

    #[test]
    fn query_rejects_zero_count() {
        let err = Query::new("rust", 0).unwrap_err();
        assert!(err.to_string().contains("requested_count"));
    }

    #[test]
    fn query_rejects_blank_topic() {
        let err = Query::new("   ", 3).unwrap_err();
        assert!(err.to_string().contains("topic"));
    }

    #[test]
    fn source_kind_display_uses_id() {
        assert_eq!(SourceKind::Arxiv.to_string(), "arxiv");
        assert_eq!(SourceKind::HackerNews.to_string(), "hackernews");
        assert_eq!(SourceKind::BraveNews.name(), "Brave News");
    }

    #[test]
    fn source_kind_all_is_complete() {
        let all = SourceKind::all();
        assert_eq!(all.len(), 6);
        assert!(all.contains(&SourceKind::Substack));
    }

    #[test]
    fn source_kind_serde_is_snake_case() {
        let json = serde_json::to_string(&SourceKind::BraveWeb).expect("serialize");
        assert_eq!(json, "\"brave_web\"");
        let decoded: SourceKind = serde_json::from_str("\"hackernews\"").expect("deserialize");
        assert_eq!(decoded, SourceKind::HackerNews);
    }

    #[test]
    fn fetch_status_usability() {
        assert!(FetchStatus::Ok.is_usable());
        assert!(FetchStatus::RedirectApplied.is_usable());
        assert!(!FetchStatus::TooShort.is_usable());
        assert!(!FetchStatus::FetchFailed("boom".into()).is_usable());
    }

    #[test]
    fn failed_document_has_no_text() {
        let candidate = RawCandidate {
            source: SourceKind::Arxiv,
            canonical_url: "https://arxiv.org/abs/1".into(),
            title: "Paper".into(),
            raw_reference: "http://arxiv.org/abs/1v1".into(),
            snippet: String::new(),
            published: None,
        };
        let doc = FetchedDocument::failed(&candidate, "https://arxiv.org/abs/1", "HTTP 503");
        assert!(!doc.is_usable());
        assert_eq!(doc.char_length, 0);
        assert_eq!(doc.fetch_status, FetchStatus::FetchFailed("HTTP 503".into()));

        let failure = CandidateFailure::from_document(&doc).expect("failure");
        assert_eq!(failure.reason, "fetch failed: HTTP 503");
        assert_eq!(failure.url, "https://arxiv.org/abs/1");
    }

    #[test]
    fn arxiv_abstract_pages_are_flagged() {
        let candidate = RawCandidate {
            source: SourceKind::BraveWeb,
            canonical_url: "https://example.com/post".into(),
            title: "Post".into(),
            raw_reference: "https://example.com/post".into(),
            snippet: String::new(),
            published: None,
        };
        let abs = FetchedDocument::failed(&candidate, "https://arxiv.org/abs/2401.00001", "x");
        let post = FetchedDocument::failed(&candidate, "https://example.com/post", "x");
        assert!(abs.is_arxiv_abstract());
        assert!(!post.is_arxiv_abstract());
    }
}
