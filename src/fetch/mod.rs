//! Time-windowed, paginated collection of new papers.
//!
//! [`TimeWindowedFetch`] walks a provider's results newest-first, keeps the
//! items whose timestamp falls inside the policy window, drops the ones the
//! dedup store already knows, and stops as soon as the target is met, the
//! fetch budget or timeout is spent, a page comes back empty, or a page
//! reaches past the window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::models::{FetchPolicy, Paper, SortOrder};
use crate::query::CompiledQuery;
use crate::sources::SourceError;
use crate::storage::DedupStore;
use crate::utils::normalize_doi;

/// Default pause between consecutive page requests
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(3);

/// Default wall-clock budget for one query
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// One page request against a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub size: usize,
    pub sort: SortOrder,
}

/// A provider that can serve recency-sorted pages for a compiled query
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        query: &CompiledQuery,
        request: PageRequest,
    ) -> Result<Vec<Paper>, SourceError>;
}

#[derive(Debug, Clone)]
pub struct TimeWindowedFetch {
    policy: FetchPolicy,
    page_delay: Duration,
    timeout: Duration,
}

impl TimeWindowedFetch {
    pub fn new(policy: FetchPolicy) -> Self {
        Self {
            policy,
            page_delay: DEFAULT_PAGE_DELAY,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Collect up to `min(policy.max_results, limit)` new papers, newest first.
    ///
    /// Candidates are checked against `store` page by page. Nothing is marked
    /// seen here: the caller records only what it finally delivers, so papers
    /// cut by any later truncation stay eligible for the next run.
    pub async fn collect(
        &self,
        query: &CompiledQuery,
        pages: &dyn PageSource,
        store: Option<&dyn DedupStore>,
        limit: usize,
    ) -> Result<Vec<Paper>, SourceError> {
        let target = self.policy.max_results.min(limit);
        if target == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let cutoff = self.policy.active_cutoff(now);
        let fetch_limit = self.policy.fetch_limit();
        let page_size = self.policy.fetch_batch_size;
        let started = Instant::now();

        let mut collected: Vec<Paper> = Vec::new();
        let mut run_seen = RunSeen::default();
        let mut offset = 0usize;
        let mut fetched = 0usize;

        loop {
            if collected.len() >= target {
                tracing::debug!("Collected {} new papers; target reached", collected.len());
                break;
            }
            if fetch_limit.is_some_and(|max| fetched >= max) {
                tracing::info!("Reached max_fetch_items={}; stop", fetched);
                break;
            }
            if started.elapsed() >= self.timeout {
                tracing::warn!("Fetch timed out after {:?} ({} items fetched)", self.timeout, fetched);
                break;
            }
            if offset > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let request = PageRequest {
                offset,
                size: page_size,
                sort: SortOrder::Descending,
            };
            let page = pages.fetch_page(query, request).await?;
            if page.is_empty() {
                tracing::debug!("Empty page at offset {}; stop", offset);
                break;
            }

            fetched += page.len();
            offset += page.len();
            let oldest = oldest_timestamp(&page);
            let page_len = page.len();

            let candidates: Vec<Paper> = page
                .into_iter()
                .filter(|p| match p.timestamp() {
                    Some(ts) => self.policy.accepts(ts, now),
                    None => {
                        tracing::debug!("Skip paper without timestamp: {}", p.paper_id);
                        false
                    }
                })
                .filter(|p| !query.excludes(&p.title, &p.r#abstract))
                .collect();

            let candidates = match store {
                Some(store) => store.filter_new(candidates)?,
                None => candidates,
            };

            let before = collected.len();
            collected.extend(candidates.into_iter().filter(|p| run_seen.insert(p)));
            tracing::debug!(
                "Page at offset {}: {} items, {} new (total {})",
                offset - page_len,
                page_len,
                collected.len() - before,
                collected.len()
            );

            if let (Some(cutoff), Some(oldest)) = (cutoff, oldest) {
                if oldest < cutoff {
                    tracing::debug!("Oldest item {} is outside the window; stop", oldest);
                    break;
                }
            }
        }

        collected.sort_by(|a, b| {
            (Reverse(a.timestamp()), &a.paper_id).cmp(&(Reverse(b.timestamp()), &b.paper_id))
        });
        collected.truncate(target);

        if collected.len() < target {
            tracing::warn!(
                "Only {} new papers found (target {}, {} items fetched)",
                collected.len(),
                target,
                fetched
            );
        }

        Ok(collected)
    }
}

/// Oldest timestamp on a page, warning when the page is not newest-first.
///
/// Takes the minimum over every dated item rather than the last item. The two
/// agree on a newest-first page; on an unsorted page the walk still stops as
/// soon as any item reaches past the window, and the data is left unsorted.
fn oldest_timestamp(page: &[Paper]) -> Option<DateTime<Utc>> {
    let stamps: Vec<DateTime<Utc>> = page.iter().filter_map(Paper::timestamp).collect();
    if stamps.windows(2).any(|w| w[0] < w[1]) {
        tracing::warn!("Provider page is not sorted newest-first; early stop may be inaccurate");
    }
    stamps.into_iter().min()
}

/// Identities accumulated during one run, so overlapping pages do not repeat items
#[derive(Debug, Default)]
struct RunSeen {
    ids: HashSet<(String, String)>,
    dois: HashSet<String>,
}

impl RunSeen {
    /// Returns false if the paper matches an identity already accepted
    fn insert(&mut self, paper: &Paper) -> bool {
        let (source, id) = paper.identity();
        let key = (source.to_string(), id.to_string());
        let doi = paper.doi.as_deref().and_then(normalize_doi);

        if self.ids.contains(&key) || doi.as_ref().is_some_and(|d| self.dois.contains(d)) {
            return false;
        }
        self.ids.insert(key);
        if let Some(doi) = doi {
            self.dois.insert(doi);
        }
        true
    }
}
