//! Fail-soft web search.
//!
//! A [`SearchBackend`] talks to a concrete provider and may fail in any way it
//! likes. [`SearchProvider`] is the adapter the agent actually calls: it caps
//! the result count and turns every failure, including a missing backend, into
//! an empty result list.

#[cfg(feature = "tavily")]
pub mod tavily;
#[cfg(feature = "tavily")]
pub use tavily::TavilyBackend;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::metrics;

/// Provider-side cap on results per call, independent of what callers ask for.
pub const DEFAULT_HARD_LIMIT: usize = 3;

/// One external search hit. Never mutated after the adapter creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: Option<f64>,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize)
    -> Result<Vec<SearchResult>, SearchError>;
}

pub type DynSearchBackend = Arc<dyn SearchBackend>;

/// Adapter over an optional backend. Stateless and cheap to clone.
#[derive(Clone)]
pub struct SearchProvider {
    backend: Option<DynSearchBackend>,
    hard_limit: usize,
}

impl SearchProvider {
    pub fn new(backend: Option<DynSearchBackend>) -> Self {
        Self {
            backend,
            hard_limit: DEFAULT_HARD_LIMIT,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_hard_limit(mut self, hard_limit: usize) -> Self {
        self.hard_limit = hard_limit.max(1);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
            .as_ref()
            .map(|backend| backend.name())
            .unwrap_or("none")
    }

    /// Never fails: unavailability of any kind yields an empty list.
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let Some(backend) = self.backend.as_ref() else {
            debug!(%query, "no search backend configured; skipping search");
            metrics::record_search("unavailable", 0);
            return Vec::new();
        };

        let requested = max_results.min(self.hard_limit);
        match backend.search(query, requested).await {
            Ok(mut results) => {
                results.truncate(self.hard_limit);
                debug!(
                    backend = backend.name(),
                    %query,
                    results = results.len(),
                    "search completed"
                );
                metrics::record_search(
                    if results.is_empty() { "empty" } else { "ok" },
                    results.len(),
                );
                results
            }
            Err(err) => {
                warn!(
                    backend = backend.name(),
                    %query,
                    error = %err,
                    "search failed; continuing without results"
                );
                metrics::record_search("error", 0);
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchProvider")
            .field("backend", &self.backend_name())
            .field("hard_limit", &self.hard_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(usize);

    #[async_trait]
    impl SearchBackend for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            Ok((0..self.0)
                .map(|idx| SearchResult::new(format!("{query} {idx}"), format!("https://x/{idx}"), ""))
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl SearchBackend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            Err(SearchError::Transport("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn missing_backend_returns_empty() {
        let provider = SearchProvider::disabled();
        assert_eq!(provider.backend_name(), "none");
        assert!(provider.search("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_absorbed() {
        let provider = SearchProvider::new(Some(Arc::new(Broken)));
        assert!(provider.search("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn results_are_capped_by_hard_limit() {
        let provider = SearchProvider::new(Some(Arc::new(Fixed(10))));
        assert_eq!(provider.search("q", 10).await.len(), DEFAULT_HARD_LIMIT);

        let provider = provider.with_hard_limit(5);
        assert_eq!(provider.search("q", 10).await.len(), 5);
    }
}
