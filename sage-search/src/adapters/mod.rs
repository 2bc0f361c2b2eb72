//! Concrete source adapters and the fixed registry that resolves them.
//!
//! The registry is the closed [`Source`] enum, built once from the
//! configured [`SourceKind`]s; there is no string-keyed lookup at run time.

pub mod arxiv;
pub mod brave;
pub mod hackernews;

pub use arxiv::ArxivAdapter;
pub use brave::BraveAdapter;
pub use hackernews::HackerNewsAdapter;

use crate::adapter::SourceAdapter;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::{Query, RawCandidate, SourceKind};

/// One resolved provider adapter.
pub enum Source {
    Arxiv(ArxivAdapter),
    Brave(BraveAdapter),
    HackerNews(HackerNewsAdapter),
}

impl Source {
    /// Resolve the adapter for `kind`.
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Arxiv => Self::Arxiv(ArxivAdapter),
            SourceKind::HackerNews => Self::HackerNews(HackerNewsAdapter),
            SourceKind::BraveWeb
            | SourceKind::BraveNews
            | SourceKind::Twitter
            | SourceKind::Substack => Self::Brave(BraveAdapter::for_brave_kind(kind)),
        }
    }

    /// Resolve every configured source, dropping duplicates while keeping
    /// configuration order.
    pub fn registry(config: &SearchConfig) -> Vec<Self> {
        let mut seen = Vec::new();
        for kind in &config.sources {
            if !seen.contains(kind) {
                seen.push(*kind);
            }
        }
        seen.into_iter().map(Self::for_kind).collect()
    }
}

impl SourceAdapter for Source {
    async fn broadcast(
        &self,
        query: &Query,
        config: &SearchConfig,
    ) -> Result<Vec<RawCandidate>, SearchError> {
        match self {
            Self::Arxiv(adapter) => adapter.broadcast(query, config).await,
            Self::Brave(adapter) => adapter.broadcast(query, config).await,
            Self::HackerNews(adapter) => adapter.broadcast(query, config).await,
        }
    }

    fn kind(&self) -> SourceKind {
        match self {
            Self::Arxiv(adapter) => adapter.kind(),
            Self::Brave(adapter) => adapter.kind(),
            Self::HackerNews(adapter) => adapter.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_resolves_to_itself() {
        for kind in SourceKind::all() {
            assert_eq!(Source::for_kind(*kind).kind(), *kind);
        }
    }

    #[test]
    fn registry_dedupes_and_keeps_order() {
        let config = SearchConfig {
            sources: vec![
                SourceKind::HackerNews,
                SourceKind::Arxiv,
                SourceKind::HackerNews,
            ],
            ..Default::default()
        };
        let kinds: Vec<SourceKind> = Source::registry(&config).iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![SourceKind::HackerNews, SourceKind::Arxiv]);
    }
}
