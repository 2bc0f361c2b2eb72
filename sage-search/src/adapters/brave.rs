//! Brave Search API adapters: web, news, and `site:`-filtered social sources.
//!
//! One implementation serves four [`SourceKind`]s. Each kind owns its query
//! translation (X / Twitter and Substack add a `site:` filter) and its
//! endpoint; all need a Brave API key.

use serde::Deserialize;

use crate::adapter::SourceAdapter;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{Query, RawCandidate, SourceKind};

/// Brave Search API adapter for one source kind.
pub struct BraveAdapter {
    kind: SourceKind,
}

impl BraveAdapter {
    /// Build an adapter for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `kind` is not Brave-backed.
    pub fn new(kind: SourceKind) -> Result<Self, SearchError> {
        match kind {
            SourceKind::BraveWeb | SourceKind::BraveNews | SourceKind::Twitter | SourceKind::Substack => {
                Ok(Self { kind })
            }
            other => Err(SearchError::Config(format!(
                "{other} is not served by the Brave API"
            ))),
        }
    }

    /// Registry constructor; callers have already matched on a Brave kind.
    pub(crate) fn for_brave_kind(kind: SourceKind) -> Self {
        Self { kind }
    }

    /// The `q` parameter sent for `topic`.
    fn query_string(&self, topic: &str) -> String {
        match self.kind {
            SourceKind::Twitter => format!("{topic} (site:twitter.com OR site:x.com)"),
            SourceKind::Substack => format!("{topic} site:substack.com"),
            _ => topic.to_owned(),
        }
    }

    fn endpoint<'a>(&self, config: &'a SearchConfig) -> &'a str {
        match self.kind {
            SourceKind::BraveNews => &config.endpoints.brave_news,
            _ => &config.endpoints.brave_web,
        }
    }
}

impl SourceAdapter for BraveAdapter {
    async fn broadcast(
        &self,
        query: &Query,
        config: &SearchConfig,
    ) -> Result<Vec<RawCandidate>, SearchError> {
        let Some(api_key) = config.resolve_brave_api_key() else {
            return Err(SearchError::unavailable(self.kind, "no API key configured"));
        };

        let q = self.query_string(query.topic());
        tracing::trace!(source = %self.kind, q, "Brave search");

        let client = http::build_client(config, config.broadcast_timeout())?;
        let count = config.per_source_limit.to_string();

        let response = client
            .get(self.endpoint(config))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", q.as_str()), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| SearchError::unavailable(self.kind, format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SearchError::unavailable(self.kind, format!("HTTP error: {e}")))?;

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::unavailable(self.kind, format!("invalid response: {e}")))?;

        let mut candidates = body.into_candidates(self.kind);
        candidates.truncate(config.per_source_limit);
        Ok(candidates)
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}

/// Response shape shared by the web and news endpoints.
///
/// Web results live under `web.results`; the news endpoint returns a
/// top-level `results` array.
#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveResults>,
    #[serde(default)]
    news: Option<BraveResults>,
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveResults {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    age: Option<String>,
    #[serde(default)]
    page_age: Option<String>,
}

impl BraveResponse {
    fn into_candidates(self, kind: SourceKind) -> Vec<RawCandidate> {
        let items = match kind {
            SourceKind::BraveNews if !self.results.is_empty() => self.results,
            SourceKind::BraveNews => self.news.map(|n| n.results).unwrap_or_default(),
            _ => self.web.map(|w| w.results).unwrap_or_default(),
        };
        items
            .into_iter()
            .filter(|item| item.url.starts_with("http"))
            .map(|item| RawCandidate {
                source: kind,
                canonical_url: item.url.trim().to_owned(),
                title: strip_markup(&item.title),
                raw_reference: item.url,
                snippet: strip_markup(&item.description),
                published: item.age.or(item.page_age),
            })
            .collect()
    }
}

/// Brave highlights matches with `<strong>`; drop tags from titles/snippets.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    crate::content::collapse_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WEB_BODY: &str = r#"{
        "web": {"results": [
            {"title": "Intro to <strong>GNNs</strong>", "url": "https://blog.example.com/gnn",
             "description": "A gentle introduction", "age": "2 days ago"},
            {"title": "No url"},
            {"title": "Second", "url": "https://example.org/b", "description": ""}
        ]}
    }"#;

    fn config_for(server: &MockServer) -> SearchConfig {
        let mut config = SearchConfig {
            brave_api_key: Some("test-key".into()),
            ..Default::default()
        };
        config.endpoints.brave_web = format!("{}/web", server.uri());
        config.endpoints.brave_news = format!("{}/news", server.uri());
        config
    }

    #[test]
    fn rejects_non_brave_kinds() {
        assert!(BraveAdapter::new(SourceKind::Arxiv).is_err());
        assert!(BraveAdapter::new(SourceKind::Substack).is_ok());
    }

    #[test]
    fn query_translation_per_kind() {
        let twitter = BraveAdapter::new(SourceKind::Twitter).expect("brave");
        assert_eq!(
            twitter.query_string("rust"),
            "rust (site:twitter.com OR site:x.com)"
        );
        let substack = BraveAdapter::new(SourceKind::Substack).expect("brave");
        assert_eq!(substack.query_string("rust"), "rust site:substack.com");
        let web = BraveAdapter::new(SourceKind::BraveWeb).expect("brave");
        assert_eq!(web.query_string("rust"), "rust");
    }

    #[test]
    fn parses_web_results_and_skips_missing_urls() {
        let body: BraveResponse = serde_json::from_str(WEB_BODY).expect("json");
        let candidates = body.into_candidates(SourceKind::BraveWeb);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Intro to GNNs");
        assert_eq!(candidates[0].published.as_deref(), Some("2 days ago"));
        assert_eq!(candidates[1].canonical_url, "https://example.org/b");
    }

    #[test]
    fn news_accepts_top_level_results() {
        let body: BraveResponse = serde_json::from_str(
            r#"{"type": "news", "results": [{"title": "Story", "url": "https://news.example.com/1"}]}"#,
        )
        .expect("json");
        let candidates = body.into_candidates(SourceKind::BraveNews);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, SourceKind::BraveNews);
    }

    #[tokio::test]
    async fn missing_key_is_source_unavailable() {
        let config = SearchConfig {
            brave_api_key: Some("   ".into()),
            ..Default::default()
        };
        // A blank key falls back to the environment.
        if std::env::var(crate::config::BRAVE_API_KEY_ENV).is_ok() {
            return;
        }
        let adapter = BraveAdapter::new(SourceKind::BraveWeb).expect("brave");
        let query = Query::new("rust", 1).expect("query");
        let err = adapter.broadcast(&query, &config).await.unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[tokio::test]
    async fn sends_token_and_site_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Subscription-Token", "test-key"))
            .and(query_param("q", "rust site:substack.com"))
            .and(query_param("count", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WEB_BODY))
            .mount(&server)
            .await;

        let adapter = BraveAdapter::new(SourceKind::Substack).expect("brave");
        let query = Query::new("rust", 2).expect("query");
        let candidates = adapter
            .broadcast(&query, &config_for(&server))
            .await
            .expect("ok");
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.source == SourceKind::Substack));
    }

    #[tokio::test]
    async fn rate_limited_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let adapter = BraveAdapter::new(SourceKind::BraveNews).expect("brave");
        let query = Query::new("rust", 2).expect("query");
        let err = adapter
            .broadcast(&query, &config_for(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::SourceUnavailable { .. }));
    }
}
