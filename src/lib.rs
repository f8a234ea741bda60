//! # Paper Tracker
//!
//! Periodic, query-driven retrieval of newly published research papers from
//! arXiv and Crossref, with deduplication across runs and across providers.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Paper, BooleanQuery, FetchPolicy)
//! - [`query`]: Compilers from boolean queries to provider query parameters
//! - [`fetch`]: Time-windowed, paginated collection of new papers
//! - [`sources`]: Provider plugins with a trait-based architecture
//! - [`services`]: Multi-provider aggregation, ranking and deduplication
//! - [`storage`]: SQLite persistence of seen identities and paper content
//! - [`utils`]: HTTP fetching with retry, identity normalization
//! - [`config`]: Configuration management

pub mod config;
pub mod fetch;
pub mod models;
pub mod query;
pub mod services;
pub mod sources;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use models::{BooleanQuery, FetchPolicy, Paper};
pub use services::AggregationService;
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
