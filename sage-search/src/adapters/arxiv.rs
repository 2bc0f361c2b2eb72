//! arXiv adapter: academic papers from the public Atom export API.
//!
//! No API key is needed. Entries are parsed with `quick-xml`; each Atom
//! `<id>` (e.g. `http://arxiv.org/abs/2401.00001v2`) becomes an HTTPS
//! abstract-page candidate.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::adapter::SourceAdapter;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http;
use crate::types::{Query, RawCandidate, SourceKind};

/// Maximum snippet length taken from an abstract, in characters.
const SNIPPET_CHARS: usize = 300;

/// arXiv Atom API adapter.
pub struct ArxivAdapter;

impl SourceAdapter for ArxivAdapter {
    async fn broadcast(
        &self,
        query: &Query,
        config: &SearchConfig,
    ) -> Result<Vec<RawCandidate>, SearchError> {
        tracing::trace!(topic = query.topic(), "arXiv search");

        let client = http::build_client(config, config.broadcast_timeout())?;
        let search_query = format!("all:{}", query.topic());
        let limit = config.per_source_limit.to_string();

        let response = client
            .get(&config.endpoints.arxiv)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::unavailable(SourceKind::Arxiv, format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SearchError::unavailable(SourceKind::Arxiv, format!("HTTP error: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::unavailable(SourceKind::Arxiv, format!("response read failed: {e}")))?;

        tracing::trace!(bytes = body.len(), "arXiv response received");

        let mut candidates = parse_atom_feed(&body)?;
        candidates.truncate(config.per_source_limit);
        Ok(candidates)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Id,
    Summary,
    Published,
}

#[derive(Default)]
struct Entry {
    title: String,
    id: String,
    summary: String,
    published: String,
}

/// Parse an arXiv Atom feed into candidates.
///
/// Entries without an `<id>` are skipped.
pub(crate) fn parse_atom_feed(xml: &str) -> Result<Vec<RawCandidate>, SearchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => entry = Some(Entry::default()),
                b"title" if entry.is_some() => field = Some(Field::Title),
                b"id" if entry.is_some() => field = Some(Field::Id),
                b"summary" if entry.is_some() => field = Some(Field::Summary),
                b"published" if entry.is_some() => field = Some(Field::Published),
                _ => field = None,
            },
            Ok(Event::Text(te)) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    let text = te
                        .unescape()
                        .map_err(|e| SearchError::Parse(format!("arXiv feed: {e}")))?;
                    let target = match f {
                        Field::Title => &mut current.title,
                        Field::Id => &mut current.id,
                        Field::Summary => &mut current.summary,
                        Field::Published => &mut current.published,
                    };
                    if !target.is_empty() {
                        target.push(' ');
                    }
                    target.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(done) = entry.take() {
                        if let Some(candidate) = entry_to_candidate(done) {
                            candidates.push(candidate);
                        }
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SearchError::Parse(format!("arXiv feed: {e}"))),
            _ => {}
        }
    }

    Ok(candidates)
}

fn entry_to_candidate(entry: Entry) -> Option<RawCandidate> {
    let raw_reference = entry.id.trim().to_owned();
    let paper_id = raw_reference.split("/abs/").nth(1)?.trim_matches('/');
    if paper_id.is_empty() {
        return None;
    }
    let summary = crate::content::collapse_whitespace(&entry.summary);
    let snippet = match summary.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &summary[..idx]),
        None => summary,
    };
    let published = entry.published.trim();

    Some(RawCandidate {
        source: SourceKind::Arxiv,
        canonical_url: format!("https://arxiv.org/abs/{paper_id}"),
        title: crate::content::collapse_whitespace(&entry.title),
        raw_reference,
        snippet,
        published: (!published.is_empty()).then(|| published.to_owned()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:graph</title>
  <id>http://arxiv.org/api/query-id</id>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v2</id>
    <published>2024-01-01T00:00:00Z</published>
    <title>Graph Neural
      Networks &amp; Friends</title>
    <summary>  We study message passing.  </summary>
    <link title="pdf" href="http://arxiv.org/pdf/2401.00001v2" rel="related"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <title>Old Paper</title>
    <summary>Strings.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_in_feed_order() {
        let candidates = parse_atom_feed(FEED).expect("parse");
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.source, SourceKind::Arxiv);
        assert_eq!(first.title, "Graph Neural Networks & Friends");
        assert_eq!(first.canonical_url, "https://arxiv.org/abs/2401.00001v2");
        assert_eq!(first.raw_reference, "http://arxiv.org/abs/2401.00001v2");
        assert_eq!(first.snippet, "We study message passing.");
        assert_eq!(first.published.as_deref(), Some("2024-01-01T00:00:00Z"));

        assert_eq!(candidates[1].canonical_url, "https://arxiv.org/abs/hep-th/9901001v1");
        assert!(candidates[1].published.is_none());
    }

    #[test]
    fn feed_title_is_not_a_candidate() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>only feed</title></feed>"#;
        assert!(parse_atom_feed(xml).expect("parse").is_empty());
    }

    #[test]
    fn malformed_feed_is_parse_error() {
        let err = parse_atom_feed("<feed><entry><id>x</feed>").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[tokio::test]
    async fn broadcast_queries_endpoint_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("search_query", "all:graph neural networks"))
            .and(query_param("max_results", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let mut config = SearchConfig {
            per_source_limit: 1,
            ..Default::default()
        };
        config.endpoints.arxiv = format!("{}/api/query", server.uri());

        let query = Query::new("graph neural networks", 3).expect("query");
        let candidates = ArxivAdapter.broadcast(&query, &config).await.expect("ok");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].canonical_url, "https://arxiv.org/abs/2401.00001v2");
    }

    #[tokio::test]
    async fn server_error_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = SearchConfig::default();
        config.endpoints.arxiv = server.uri();

        let query = Query::new("rust", 1).expect("query");
        let err = ArxivAdapter.broadcast(&query, &config).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::SourceUnavailable {
                kind: SourceKind::Arxiv,
                ..
            }
        ));
    }
}
