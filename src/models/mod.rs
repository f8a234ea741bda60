//! Core data models for papers, queries and fetch policies.

mod paper;
mod policy;
mod search;

pub use paper::{Extensions, Paper, PaperBuilder, PaperLinks, SourceType};
pub use policy::{FetchPolicy, PolicyError, UNBOUNDED};
pub use search::{BooleanQuery, Field, FieldQuery, QueryError, SortOrder};
