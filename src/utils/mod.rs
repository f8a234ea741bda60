//! Utility modules supporting provider fetching and result merging.
//!
//! - [`RetryingFetcher`]: HTTP fetcher with retry, backoff and endpoint fallback
//! - [`with_retry`] / [`RetryConfig`]: generic retry loop with exponential backoff and jitter
//! - [`deduplicate_papers`] / [`sort_by_recency`]: in-batch ranking and duplicate removal
//! - [`normalize_doi`] / [`normalize_title`]: identity normalization shared with the store

mod dedup;
mod http;
mod retry;

pub use dedup::{
    deduplicate_papers, normalize_doi, normalize_title, sort_by_recency, DedupKey,
    SourcePriority, MIN_TITLE_KEY_LEN,
};
pub use http::{FetcherOptions, RetryingFetcher, USER_AGENT};
pub use retry::{
    arxiv_retry_config, crossref_retry_config, with_retry, RetryConfig, TransientError,
};
