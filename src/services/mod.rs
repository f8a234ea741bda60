//! Multi-provider aggregation.
//!
//! [`AggregationService`] runs a query against every configured provider in
//! priority order, records each provider's outcome, and merges the
//! successful results into one recency-ordered, deduplicated list. With a
//! dedup store attached, only the papers finally returned are recorded.

use std::fmt;
use std::sync::Arc;

use crate::models::{BooleanQuery, Paper};
use crate::sources::{Source, SourceError};
use crate::storage::{DedupStore, StorageError};
use crate::utils::{deduplicate_papers, sort_by_recency, SourcePriority};

/// A provider that failed during a search
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// Result of running one provider
#[derive(Debug)]
pub enum SourceOutcome {
    Success { source: String, papers: Vec<Paper> },
    Failure(SourceFailure),
}

impl SourceOutcome {
    pub fn source(&self) -> &str {
        match self {
            SourceOutcome::Success { source, .. } => source,
            SourceOutcome::Failure(failure) => &failure.source,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SourceOutcome::Success { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("No search sources configured")]
    NoSources,

    #[error("All search sources failed: {}", join_failures(.0))]
    AllSourcesFailed(Vec<SourceFailure>),

    #[error("Failed to record seen papers: {0}")]
    Storage(#[from] StorageError),
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fans a query out to every provider and merges the results
#[derive(Debug)]
pub struct AggregationService {
    sources: Vec<Arc<dyn Source>>,
    priority: SourcePriority,
    store: Option<Arc<dyn DedupStore>>,
}

impl AggregationService {
    /// `sources` in priority order: on duplicates, earlier sources win
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        let priority = SourcePriority::new(sources.iter().map(|s| s.id().to_string()));
        Self {
            sources,
            priority,
            store: None,
        }
    }

    /// Record every returned batch in `store`
    pub fn with_store(mut self, store: Arc<dyn DedupStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Run `query` against every source sequentially, collecting one outcome per source
    pub async fn run_all(&self, query: &BooleanQuery, limit: usize) -> Vec<SourceOutcome> {
        let mut outcomes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let outcome = match source.search(query, limit).await {
                Ok(papers) => {
                    tracing::info!(
                        "{} returned {} papers for [{}]",
                        source.name(),
                        papers.len(),
                        query.label()
                    );
                    SourceOutcome::Success {
                        source: source.id().to_string(),
                        papers,
                    }
                }
                Err(e) => {
                    tracing::warn!("Search failed for {}: {}", source.id(), e);
                    SourceOutcome::Failure(SourceFailure {
                        source: source.id().to_string(),
                        error: e,
                    })
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Search all sources and return at most `limit` papers, newest first.
    ///
    /// Fails only when every source fails; partial failures are logged.
    /// Papers dropped by the final cut are not marked seen.
    pub async fn search(&self, query: &BooleanQuery, limit: usize) -> Result<Vec<Paper>, SearchError> {
        if self.sources.is_empty() {
            return Err(SearchError::NoSources);
        }

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for outcome in self.run_all(query, limit).await {
            match outcome {
                SourceOutcome::Success { papers, .. } => merged.extend(papers),
                SourceOutcome::Failure(failure) => failures.push(failure),
            }
        }

        if failures.len() == self.sources.len() {
            return Err(SearchError::AllSourcesFailed(failures));
        }

        let papers = self.merge(merged, limit);
        if let Some(store) = &self.store {
            store.mark_seen(&papers)?;
        }
        Ok(papers)
    }

    /// Rank, deduplicate and truncate a merged batch
    pub fn merge(&self, mut papers: Vec<Paper>, limit: usize) -> Vec<Paper> {
        let total = papers.len();
        sort_by_recency(&mut papers, &self.priority);
        let mut papers = deduplicate_papers(papers, &self.priority);
        if papers.len() < total {
            tracing::debug!("Removed {} cross-source duplicates", total - papers.len());
            // A winning duplicate takes the slot of the copy it replaced
            sort_by_recency(&mut papers, &self.priority);
        }
        papers.truncate(limit);
        papers
    }

    /// Close every source; a failure to close one source does not stop the others
    pub async fn close(&self) {
        for source in &self.sources {
            if let Err(e) = source.close().await {
                tracing::warn!("Failed to close {}: {}", source.id(), e);
            }
        }
    }
}
