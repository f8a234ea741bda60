//! Translation of [`BooleanQuery`] values into provider request parameters.
//!
//! Compilers are pure: the same query and scope always give the same
//! [`CompiledQuery`], and compilation never touches the network.

mod arxiv;
mod crossref;

pub use arxiv::ArxivQueryCompiler;
pub use crossref::CrossRefQueryCompiler;

use crate::models::{BooleanQuery, QueryError};

/// Provider-native query parameters plus any post-fetch exclusions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Query-string parameters, in a stable order
    pub params: Vec<(String, String)>,
    /// Lower-cased terms whose presence in title or abstract rejects a candidate.
    ///
    /// Filled for providers that cannot express negation natively.
    pub exclude_terms: Vec<String>,
}

impl CompiledQuery {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self {
            params,
            exclude_terms: Vec::new(),
        }
    }

    /// Value of the first parameter named `key`
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the candidate text contains an exclusion term
    pub fn excludes(&self, title: &str, abstract_text: &str) -> bool {
        if self.exclude_terms.is_empty() {
            return false;
        }
        let haystack = format!("{} {}", title, abstract_text).to_lowercase();
        self.exclude_terms.iter().any(|term| haystack.contains(term.as_str()))
    }
}

impl std::fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join("&"))?;
        if !self.exclude_terms.is_empty() {
            write!(f, " [exclude: {}]", self.exclude_terms.join(", "))?;
        }
        Ok(())
    }
}

/// Compiles a query, intersected with an optional global scope, for one provider
pub trait QueryCompiler: Send + Sync + std::fmt::Debug {
    fn compile(
        &self,
        query: &BooleanQuery,
        scope: Option<&BooleanQuery>,
    ) -> Result<CompiledQuery, QueryError>;
}
