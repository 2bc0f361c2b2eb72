//! Hacker News adapter via the Algolia search API.
//!
//! Only stories that link out to a URL become candidates; "Ask HN" style
//! text posts have nothing to fetch.

use serde::Deserialize;

use crate::adapter::SourceAdapter;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{Query, RawCandidate, SourceKind};

/// Hacker News (Algolia) adapter.
pub struct HackerNewsAdapter;

impl SourceAdapter for HackerNewsAdapter {
    async fn broadcast(
        &self,
        query: &Query,
        config: &SearchConfig,
    ) -> Result<Vec<RawCandidate>, SearchError> {
        tracing::trace!(topic = query.topic(), "Hacker News search");

        let client = http::build_client(config, config.broadcast_timeout())?;
        let hits_per_page = config.per_source_limit.to_string();

        let response = client
            .get(&config.endpoints.hackernews)
            .query(&[
                ("query", query.topic()),
                ("tags", "story"),
                ("hitsPerPage", hits_per_page.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                SearchError::unavailable(SourceKind::HackerNews, format!("request failed: {e}"))
            })?
            .error_for_status()
            .map_err(|e| SearchError::unavailable(SourceKind::HackerNews, format!("HTTP error: {e}")))?;

        let body: AlgoliaResponse = response.json().await.map_err(|e| {
            SearchError::unavailable(SourceKind::HackerNews, format!("invalid response: {e}"))
        })?;

        let mut candidates = body.into_candidates();
        candidates.truncate(config.per_source_limit);
        Ok(candidates)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::HackerNews
    }
}

#[derive(Debug, Deserialize)]
struct AlgoliaResponse {
    #[serde(default)]
    hits: Vec<AlgoliaHit>,
}

#[derive(Debug, Deserialize)]
struct AlgoliaHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    created_at: Option<String>,
}

impl AlgoliaResponse {
    fn into_candidates(self) -> Vec<RawCandidate> {
        self.hits
            .into_iter()
            .filter_map(|hit| {
                let url = hit.url.filter(|u| u.starts_with("http"))?;
                Some(RawCandidate {
                    source: SourceKind::HackerNews,
                    canonical_url: url.trim().to_owned(),
                    title: hit.title.unwrap_or_default().trim().to_owned(),
                    raw_reference: url,
                    snippet: format!(
                        "Points: {} | Comments: {}",
                        hit.points.unwrap_or(0),
                        hit.num_comments.unwrap_or(0)
                    ),
                    published: hit.created_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"{"hits": [
        {"title": "Show HN: A GNN library", "url": "https://github.com/x/gnn",
         "points": 120, "num_comments": 34, "created_at": "2024-03-01T10:00:00Z"},
        {"title": "Ask HN: GNN resources?", "url": null, "points": 5},
        {"title": "Blog", "url": "https://blog.example.com/post", "points": null}
    ]}"#;

    #[test]
    fn keeps_only_hits_with_urls() {
        let body: AlgoliaResponse = serde_json::from_str(BODY).expect("json");
        let candidates = body.into_candidates();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].snippet, "Points: 120 | Comments: 34");
        assert_eq!(candidates[0].published.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(candidates[1].snippet, "Points: 0 | Comments: 0");
    }

    #[tokio::test]
    async fn broadcast_requests_stories() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("tags", "story"))
            .and(query_param("query", "graph neural networks"))
            .and(query_param("hitsPerPage", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let mut config = SearchConfig::default();
        config.endpoints.hackernews = server.uri();

        let query = Query::new("graph neural networks", 2).expect("query");
        let candidates = HackerNewsAdapter.broadcast(&query, &config).await.expect("ok");
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.source == SourceKind::HackerNews));
    }

    #[tokio::test]
    async fn garbage_body_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let mut config = SearchConfig::default();
        config.endpoints.hackernews = server.uri();

        let query = Query::new("rust", 1).expect("query");
        let err = HackerNewsAdapter.broadcast(&query, &config).await.unwrap_err();
        assert!(err.to_string().contains("invalid response"));
    }
}
