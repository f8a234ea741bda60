//! Paper providers with a shared trait-based architecture.
//!
//! This module defines the [`Source`] trait that every provider implements.
//! A provider binds together a query compiler, a retrying fetcher, a payload
//! parser and the time-windowed fetch strategy. The [`SourceRegistry`] builds
//! the configured providers in priority order.
//!
//! # Feature Flags
//!
//! Individual providers can be disabled at compile time using Cargo features:
//!
//! - `arxiv` - Enable arXiv source (default: enabled)
//! - `crossref` - Enable Crossref source (default: enabled)

#[cfg(feature = "source-arxiv")]
mod arxiv;
#[cfg(feature = "source-crossref")]
mod crossref;
mod registry;

pub mod mock;

#[cfg(feature = "source-arxiv")]
pub use arxiv::{ArxivFeedParser, ArxivSource};
#[cfg(feature = "source-crossref")]
pub use crossref::{CrossRefParser, CrossRefSource};
pub use mock::MockSource;
pub use registry::SourceRegistry;

use async_trait::async_trait;

use crate::models::{BooleanQuery, Paper, QueryError};
use crate::storage::StorageError;

/// The Source trait defines the interface for all paper providers.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Implement `id`, `name` and `search`; override `close` if the source holds resources
/// 3. Add the source to [`SourceRegistry::from_config`]
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source ("arxiv", "crossref"); also the persisted source id
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Return up to `limit` new papers matching `query`, most recent first
    async fn search(&self, query: &BooleanQuery, limit: usize) -> Result<Vec<Paper>, SourceError>;

    /// Release network resources. Calling it twice is harmless.
    async fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Turns a raw provider payload into papers
pub trait FeedParser: Send + Sync + std::fmt::Debug {
    fn parse(&self, payload: &str) -> Result<Vec<Paper>, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429
    #[error("Rate limit exceeded")]
    RateLimit,

    /// HTTP 500, 502, 503 or 504
    #[error("Server error: HTTP {0}")]
    Server(u16),

    /// Any other non-success status; never retried
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Every endpoint exhausted its retry budget
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<SourceError>,
    },

    /// Parsing error (XML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters or query definition
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The source was closed
    #[error("Source is closed")]
    Closed,

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

impl From<QueryError> for SourceError {
    fn from(err: QueryError) -> Self {
        SourceError::InvalidRequest(err.to_string())
    }
}
