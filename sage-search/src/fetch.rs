//! Document fetcher: retrieve, clean and length-gate one candidate.
//!
//! PDF references are rewritten to their abstract page before any request
//! is made, and a response that still arrives as a PDF gets the same
//! rewrite applied to its final URL and is re-fetched once. Binary content
//! is never parsed. Every failure is folded into the returned
//! [`FetchedDocument`]; [`Fetcher::fetch`] itself cannot fail.

use crate::cache::DocumentCache;
use crate::config::SearchConfig;
use crate::content;
use crate::error::SearchError;
use crate::http;
use crate::orchestrator::url_normalize::{rewrite_pdf_reference, CanonicalKey};
use crate::types::{FetchStatus, FetchedDocument, RawCandidate};

/// What a single HTTP round trip produced.
enum Retrieved {
    Html(String),
    Pdf { final_url: String },
}

/// Fetches and normalises candidate documents.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    min_chars: usize,
    max_chars: usize,
    cache: Option<DocumentCache>,
}

impl Fetcher {
    /// Build a fetcher from config; requests time out after
    /// `config.fetch_timeout()`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(config, config.fetch_timeout())?,
            min_chars: config.min_chars,
            max_chars: config.max_chars,
            cache: DocumentCache::new(config.cache_ttl_seconds),
        })
    }

    /// Fetch `candidate` and classify the result.
    pub async fn fetch(&self, candidate: &RawCandidate) -> FetchedDocument {
        let (target, rewritten) = match rewrite_pdf_reference(&candidate.canonical_url) {
            Some(abs) => (abs, true),
            None => (candidate.canonical_url.clone(), false),
        };

        if let Some(cache) = &self.cache {
            if let Some(mut hit) = cache.get(&target).await {
                tracing::trace!(url = %target, "document cache hit");
                hit.source = candidate.source;
                return hit;
            }
        }

        let document = self.fetch_uncached(candidate, target.clone(), rewritten).await;
        if let Some(cache) = &self.cache {
            cache.insert(&target, &document).await;
        }
        document
    }

    async fn fetch_uncached(
        &self,
        candidate: &RawCandidate,
        mut target: String,
        mut rewritten: bool,
    ) -> FetchedDocument {
        let html = loop {
            match self.retrieve(&target).await {
                Ok(Retrieved::Html(html)) => break html,
                Ok(Retrieved::Pdf { final_url }) => {
                    let retry = if rewritten {
                        None
                    } else {
                        rewrite_pdf_reference(&final_url)
                    };
                    match retry {
                        Some(abs) => {
                            tracing::debug!(from = %final_url, to = %abs, "PDF response, fetching abstract page");
                            target = abs;
                            rewritten = true;
                        }
                        None => {
                            return FetchedDocument::failed(candidate, &target, "binary PDF content");
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(url = %target, error = %err, "fetch failed");
                    return FetchedDocument::failed(candidate, &target, err.to_string());
                }
            }
        };

        let page = content::extract(&html, self.max_chars);
        let char_length = page.char_length();
        let title = if page.title.is_empty() {
            candidate.title.clone()
        } else {
            page.title
        };
        let key = CanonicalKey::from_url(&target);

        if char_length < self.min_chars {
            tracing::debug!(url = %target, char_length, min = self.min_chars, "document too short");
            return FetchedDocument {
                source: candidate.source,
                canonical_url: target,
                key,
                title,
                normalized_text: String::new(),
                char_length,
                fetch_status: FetchStatus::TooShort,
            };
        }

        FetchedDocument {
            source: candidate.source,
            canonical_url: target,
            key,
            title,
            normalized_text: page.text,
            char_length,
            fetch_status: if rewritten {
                FetchStatus::RedirectApplied
            } else {
                FetchStatus::Ok
            },
        }
    }

    async fn retrieve(&self, url: &str) -> Result<Retrieved, SearchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Http(format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("application/pdf") {
            return Ok(Retrieved::Pdf { final_url });
        }
        if is_binary_content_type(&content_type) {
            return Err(SearchError::Parse(format!(
                "unsupported content type: {content_type}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("response read failed: {e}")))?;
        Ok(Retrieved::Html(body))
    }
}

fn is_binary_content_type(content_type: &str) -> bool {
    ["image/", "audio/", "video/", "application/octet-stream", "application/zip"]
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
}
