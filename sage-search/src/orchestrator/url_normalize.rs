//! Canonical keys for candidate deduplication, plus the PDF reference rewrite
//! the fetcher applies before retrieval.
//!
//! Two references that point at the same document (differing only in
//! capitalisation, `www.`, tracking parameters, fragments, parameter order,
//! a trailing slash, a `/pdf/` vs `/abs/` path or an arXiv version suffix)
//! produce the same [`CanonicalKey`].

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Tracking query parameters that are stripped during normalisation.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "ref_src",
    "si",
    "feature",
];

/// Normalised identity of a document URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Derive the key for `raw`.
    ///
    /// Unparseable input is trimmed and lowercased so that it still
    /// compares consistently with itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use sage_search::orchestrator::url_normalize::CanonicalKey;
    ///
    /// let a = CanonicalKey::from_url("https://www.arxiv.org/pdf/2401.00001v2.pdf");
    /// let b = CanonicalKey::from_url("https://arxiv.org/abs/2401.00001");
    /// assert_eq!(a, b);
    /// ```
    pub fn from_url(raw: &str) -> Self {
        Self(normalize_url(raw))
    }

    /// The normalised URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise a URL for deduplication comparison.
///
/// 1. Lowercase scheme and host, drop a leading `www.`.
/// 2. Remove default ports (`:80` for HTTP, `:443` for HTTPS).
/// 3. Strip tracking parameters and sort the remainder.
/// 4. Remove the fragment.
/// 5. Collapse `/pdf/` to `/abs/`, drop a trailing `.pdf`, and on arXiv
///    drop the `vN` version suffix.
/// 6. Remove a trailing slash (unless the path is exactly `"/"`).
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };

    parsed.set_fragment(None);

    if is_default_port(&parsed) {
        let _ = parsed.set_port(None);
    }

    if let Some(host) = parsed.host_str().map(str::to_owned) {
        if let Some(bare) = host.strip_prefix("www.") {
            let _ = parsed.set_host(Some(bare));
        }
    }

    let params: Vec<(String, String)> = {
        let mut params: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| {
                let k = key.to_lowercase();
                !TRACKING_PARAMS.contains(&k.as_str())
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        params
    };
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        let qs = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&qs));
    }

    let is_arxiv = parsed
        .host_str()
        .is_some_and(|h| h == "arxiv.org" || h.ends_with(".arxiv.org"));
    let mut path = collapse_pdf_path(parsed.path());
    if is_arxiv {
        path = strip_arxiv_version(&path);
    }
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    parsed.set_path(&path);

    parsed.to_string()
}

/// Rewrite a PDF-typed reference to its abstract/landing page.
///
/// Returns `None` when `raw` is not a PDF reference. Query and fragment
/// are preserved; only the path changes.
///
/// ```
/// use sage_search::orchestrator::url_normalize::rewrite_pdf_reference;
///
/// assert_eq!(
///     rewrite_pdf_reference("https://site/pdf/1234.pdf").as_deref(),
///     Some("https://site/abs/1234"),
/// );
/// assert_eq!(rewrite_pdf_reference("https://site/abs/1234"), None);
/// ```
pub fn rewrite_pdf_reference(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    let path = parsed.path().to_owned();
    if !is_pdf_path(&path) {
        return None;
    }
    let rewritten = collapse_pdf_path(&path);
    parsed.set_path(&rewritten);
    Some(parsed.to_string())
}

/// Returns `true` if the path names a PDF (a `/pdf/` segment or `.pdf` suffix).
pub fn is_pdf_path(path: &str) -> bool {
    path.contains("/pdf/") || path.to_ascii_lowercase().ends_with(".pdf")
}

fn collapse_pdf_path(path: &str) -> String {
    let mut out = path.replacen("/pdf/", "/abs/", 1);
    if out.to_ascii_lowercase().ends_with(".pdf") {
        out.truncate(out.len() - 4);
    }
    out
}

/// Drop a trailing `vN` from the last path segment of an arXiv id
/// (`/abs/2401.00001v3` -> `/abs/2401.00001`).
fn strip_arxiv_version(path: &str) -> String {
    let Some((head, last)) = path.rsplit_once('/') else {
        return path.to_owned();
    };
    let Some(v_pos) = last.rfind('v') else {
        return path.to_owned();
    };
    let (id, version) = last.split_at(v_pos);
    let digits = &version[1..];
    let id_has_digit = id.chars().last().is_some_and(|c| c.is_ascii_digit());
    if id_has_digit && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("{head}/{id}")
    } else {
        path.to_owned()
    }
}

fn is_default_port(url: &Url) -> bool {
    matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> String {
        CanonicalKey::from_url(raw).to_string()
    }

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(key("HTTPS://Example.COM/Path"), "https://example.com/Path");
    }

    #[test]
    fn strips_www_prefix() {
        assert_eq!(key("https://www.example.com/a"), key("https://example.com/a"));
    }

    #[test]
    fn removes_trailing_slash_but_keeps_root() {
        assert_eq!(key("https://example.com/path/"), "https://example.com/path");
        assert_eq!(key("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn removes_default_ports_only() {
        assert_eq!(key("http://example.com:80/p"), "http://example.com/p");
        assert_eq!(key("https://example.com:443/p"), "https://example.com/p");
        assert_eq!(key("https://example.com:8080/p"), "https://example.com:8080/p");
    }

    #[test]
    fn strips_tracking_and_sorts_params() {
        assert_eq!(
            key("https://example.com/s?z=1&utm_source=x&a=2&fbclid=abc"),
            "https://example.com/s?a=2&z=1"
        );
    }

    #[test]
    fn removes_fragment() {
        assert_eq!(key("https://example.com/page#section"), "https://example.com/page");
    }

    #[test]
    fn pdf_and_abs_collapse() {
        assert_eq!(
            key("https://arxiv.org/pdf/2401.00001.pdf"),
            key("https://arxiv.org/abs/2401.00001")
        );
        assert_eq!(
            key("https://site.org/pdf/1234.pdf"),
            "https://site.org/abs/1234"
        );
    }

    #[test]
    fn arxiv_version_suffix_stripped() {
        assert_eq!(
            key("http://arxiv.org/abs/2401.00001v3"),
            "http://arxiv.org/abs/2401.00001"
        );
        assert_eq!(
            key("https://arxiv.org/abs/hep-th/9901001v1"),
            "https://arxiv.org/abs/hep-th/9901001"
        );
    }

    #[test]
    fn version_like_paths_off_arxiv_untouched() {
        assert_eq!(key("https://example.com/api/v2"), "https://example.com/api/v2");
    }

    #[test]
    fn invalid_url_is_lowercased() {
        assert_eq!(key("  Not A URL "), "not a url");
    }

    #[test]
    fn rewrite_pdf_reference_examples() {
        assert_eq!(
            rewrite_pdf_reference("https://site/pdf/1234.pdf").as_deref(),
            Some("https://site/abs/1234")
        );
        assert_eq!(
            rewrite_pdf_reference("https://arxiv.org/pdf/2401.00001v2").as_deref(),
            Some("https://arxiv.org/abs/2401.00001v2")
        );
        assert_eq!(
            rewrite_pdf_reference("https://example.com/paper.PDF").as_deref(),
            Some("https://example.com/paper")
        );
        assert!(rewrite_pdf_reference("https://example.com/article").is_none());
        assert!(rewrite_pdf_reference("not a url").is_none());
    }

    #[test]
    fn key_serde_is_transparent() {
        let k = CanonicalKey::from_url("https://example.com/a");
        let json = serde_json::to_string(&k).expect("serialize");
        assert_eq!(json, "\"https://example.com/a\"");
    }
}
