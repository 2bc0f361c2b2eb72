//! Retrieval configuration with sensible defaults.
//!
//! [`SearchConfig`] controls which sources are broadcast to, the three
//! independent deadlines (per source, per fetch, and the caller's run
//! deadline which lives outside this crate), fetch fan-out, the minimum
//! document length and the ranking tie epsilon.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SearchError;
use crate::types::SourceKind;

/// Environment variable consulted when no Brave API key is configured.
pub const BRAVE_API_KEY_ENV: &str = "BRAVE_API_KEY";

/// Configuration for a retrieval run.
///
/// Deserialises from the `[search]` table of the application config; every
/// field falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Sources to broadcast to. Queried concurrently; candidates are merged.
    pub sources: Vec<SourceKind>,
    /// Maximum candidates requested from each source.
    pub per_source_limit: usize,
    /// Deadline for each source's broadcast, in seconds.
    pub broadcast_timeout_seconds: u64,
    /// Deadline for each individual document fetch, in seconds.
    pub fetch_timeout_seconds: u64,
    /// Maximum fetches in flight at once.
    pub fetch_concurrency: usize,
    /// Documents with fewer cleaned characters than this are `TooShort`.
    pub min_chars: usize,
    /// Cleaned text is truncated to this many characters.
    pub max_chars: usize,
    /// Scores within this distance of a tie group's highest score join the group.
    pub tie_epsilon: f64,
    /// How long fetched documents stay cached, in seconds. 0 disables the cache.
    pub cache_ttl_seconds: u64,
    /// Custom User-Agent string. If `None`, rotates through a built-in list.
    pub user_agent: Option<String>,
    /// Brave Search API key. Falls back to `BRAVE_API_KEY` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brave_api_key: Option<String>,
    /// Provider endpoints; overridable for tests and self-hosted mirrors.
    pub endpoints: Endpoints,
}

/// Base URLs for each provider API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub arxiv: String,
    pub brave_web: String,
    pub brave_news: String,
    pub hackernews: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            arxiv: "http://export.arxiv.org/api/query".into(),
            brave_web: "https://api.search.brave.com/res/v1/web/search".into(),
            brave_news: "https://api.search.brave.com/res/v1/news/search".into(),
            hackernews: "https://hn.algolia.com/api/v1/search".into(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            sources: SourceKind::all().to_vec(),
            per_source_limit: 5,
            broadcast_timeout_seconds: 10,
            fetch_timeout_seconds: 10,
            fetch_concurrency: 8,
            min_chars: 800,
            max_chars: 100_000,
            tie_epsilon: 1e-6,
            cache_ttl_seconds: 600,
            user_agent: None,
            brave_api_key: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `sources` must not be empty
    /// - `per_source_limit`, `fetch_concurrency` must be greater than 0
    /// - both timeouts must be greater than 0
    /// - `max_chars` must be at least `min_chars`
    /// - `tie_epsilon` must be finite and positive
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.sources.is_empty() {
            return Err(SearchError::Config(
                "at least one source must be enabled".into(),
            ));
        }
        if self.per_source_limit == 0 {
            return Err(SearchError::Config(
                "per_source_limit must be greater than 0".into(),
            ));
        }
        if self.broadcast_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "broadcast_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.fetch_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "fetch_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(SearchError::Config(
                "fetch_concurrency must be greater than 0".into(),
            ));
        }
        if self.max_chars < self.min_chars {
            return Err(SearchError::Config(
                "max_chars must be >= min_chars".into(),
            ));
        }
        if !self.tie_epsilon.is_finite() || self.tie_epsilon <= 0.0 {
            return Err(SearchError::Config(
                "tie_epsilon must be a positive finite number".into(),
            ));
        }
        Ok(())
    }

    /// Per-source broadcast deadline.
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_timeout_seconds)
    }

    /// Per-fetch deadline.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// The Brave API key from config, or from the environment.
    ///
    /// Blank values count as missing.
    pub fn resolve_brave_api_key(&self) -> Option<String> {
        let non_blank = |key: &String| !key.trim().is_empty();
        self.brave_api_key
            .clone()
            .filter(non_blank)
            .or_else(|| std::env::var(BRAVE_API_KEY_ENV).ok().filter(non_blank))
    }
}
