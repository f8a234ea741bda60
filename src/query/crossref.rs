//! Crossref `query.*` parameter compiler.
//!
//! Crossref ranks by free-text relevance, so positive terms are space-joined
//! and NOT terms are sent as `-term` hints. Because those hints are not
//! enforced, NOT terms are also returned as exclusion terms for post-fetch
//! filtering. CATEGORY has no Crossref equivalent and only contributes
//! exclusions.

use std::collections::{BTreeMap, HashSet};

use super::{CompiledQuery, QueryCompiler};
use crate::models::{BooleanQuery, Field, QueryError};

#[derive(Debug, Clone, Copy, Default)]
pub struct CrossRefQueryCompiler;

impl CrossRefQueryCompiler {
    pub fn new() -> Self {
        Self
    }
}

fn crossref_param(field: Field) -> Option<&'static str> {
    match field {
        Field::Text | Field::Title | Field::Abstract => Some("query.bibliographic"),
        Field::Author => Some("query.author"),
        Field::Journal => Some("query.container-title"),
        Field::Category => None,
    }
}

#[derive(Default)]
struct ParamTerms {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl QueryCompiler for CrossRefQueryCompiler {
    fn compile(
        &self,
        query: &BooleanQuery,
        scope: Option<&BooleanQuery>,
    ) -> Result<CompiledQuery, QueryError> {
        let mut by_param: BTreeMap<&'static str, ParamTerms> = BTreeMap::new();
        let mut exclude_terms = Vec::new();

        for (field, fq) in scope.into_iter().chain(std::iter::once(query)).flat_map(|q| q.fields()) {
            exclude_terms.extend(fq.not.iter().map(|t| t.to_lowercase()));

            let Some(param) = crossref_param(field) else {
                tracing::debug!("Crossref has no {} filter; only NOT terms are applied", field);
                continue;
            };
            let entry = by_param.entry(param).or_default();
            entry.positive.extend(fq.positive_terms().map(str::to_string));
            entry.negative.extend(fq.not.iter().cloned());
        }

        let params = by_param
            .into_iter()
            .filter(|(_, terms)| !terms.positive.is_empty())
            .map(|(param, terms)| {
                let mut parts = dedup_preserve_order(terms.positive);
                parts.extend(
                    dedup_preserve_order(terms.negative)
                        .into_iter()
                        .map(|t| format!("-{}", t)),
                );
                (param.to_string(), parts.join(" "))
            })
            .collect();

        Ok(CompiledQuery {
            params,
            exclude_terms: dedup_preserve_order(exclude_terms),
        })
    }
}

/// Drop case-insensitive repeats, keeping the first spelling
fn dedup_preserve_order(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}
