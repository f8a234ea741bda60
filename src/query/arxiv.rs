//! arXiv `search_query` compiler.
//!
//! Field mapping: TEXT -> ti|abs, TITLE -> ti, ABSTRACT -> abs, AUTHOR -> au,
//! CATEGORY -> cat, JOURNAL -> jr|co. Phrases are quoted, and every term is
//! also searched in its space/hyphen variant ("deep learning" also matches
//! "deep-learning").

use super::{CompiledQuery, QueryCompiler};
use crate::models::{BooleanQuery, Field, FieldQuery, QueryError};

/// Expression matching every record, used when a query has no positive part
pub const MATCH_ALL: &str = "all:*";

#[derive(Debug, Clone, Copy, Default)]
pub struct ArxivQueryCompiler;

impl ArxivQueryCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile to the bare `search_query` expression
    pub fn expression(&self, query: &BooleanQuery, scope: Option<&BooleanQuery>) -> String {
        let parts: Vec<String> = scope
            .into_iter()
            .chain(std::iter::once(query))
            .flat_map(|q| q.fields())
            .filter_map(|(field, fq)| compile_field(field, fq))
            .collect();

        if parts.is_empty() {
            MATCH_ALL.to_string()
        } else {
            group(parts, "AND")
        }
    }
}

impl QueryCompiler for ArxivQueryCompiler {
    fn compile(
        &self,
        query: &BooleanQuery,
        scope: Option<&BooleanQuery>,
    ) -> Result<CompiledQuery, QueryError> {
        let expression = self.expression(query, scope);
        Ok(CompiledQuery::new(vec![(
            "search_query".to_string(),
            expression,
        )]))
    }
}

fn arxiv_fields(field: Field) -> &'static [&'static str] {
    match field {
        Field::Text => &["ti", "abs"],
        Field::Title => &["ti"],
        Field::Abstract => &["abs"],
        Field::Author => &["au"],
        Field::Category => &["cat"],
        Field::Journal => &["jr", "co"],
    }
}

fn compile_field(field: Field, fq: &FieldQuery) -> Option<String> {
    let fields = arxiv_fields(field);

    let mut parts: Vec<String> = fq.and.iter().map(|t| term_group(fields, t)).collect();
    if !fq.or.is_empty() {
        parts.push(group(
            fq.or.iter().map(|t| term_group(fields, t)).collect(),
            "OR",
        ));
    }
    let positive = (!parts.is_empty()).then(|| group(parts, "AND"));

    if fq.not.is_empty() {
        let negative = enclose(group(
            fq.not.iter().map(|t| term_group(fields, t)).collect(),
            "OR",
        ));
        let base = positive.unwrap_or_else(|| MATCH_ALL.to_string());
        return Some(format!("({} AND NOT {})", base, negative));
    }

    positive
}

/// Join with `op`, parenthesizing only when there is more than one part
fn group(parts: Vec<String>, op: &str) -> String {
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_default();
    }
    format!("({})", parts.join(&format!(" {} ", op)))
}

fn term_group(fields: &[&str], term: &str) -> String {
    group(
        expand_variants(term)
            .iter()
            .map(|v| field_or(fields, v))
            .collect(),
        "OR",
    )
}

fn field_or(fields: &[&str], term: &str) -> String {
    let quoted = quote(term);
    group(
        fields.iter().map(|f| format!("{}:{}", f, quoted)).collect(),
        "OR",
    )
}

fn is_quoted(term: &str) -> bool {
    term.len() >= 2
        && ((term.starts_with('"') && term.ends_with('"'))
            || (term.starts_with('\'') && term.ends_with('\'')))
}

fn quote(term: &str) -> String {
    let t = term.trim();
    if is_quoted(t) || !t.chars().any(|c| c.is_whitespace() || c == '-') {
        t.to_string()
    } else {
        format!("\"{}\"", t)
    }
}

/// The term plus its space/hyphen variants, longest first
fn expand_variants(term: &str) -> Vec<String> {
    let t = term.trim();
    let mut out = vec![t.to_string()];
    if t.contains(' ') {
        out.push(t.replace(' ', "-"));
    }
    if t.contains('-') {
        out.push(t.replace('-', " "));
    }
    out.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    out.dedup();
    out
}

/// Wrap in parentheses unless the whole expression is already one group
fn enclose(expr: String) -> String {
    if is_enclosed(&expr) {
        expr
    } else {
        format!("({})", expr)
    }
}

fn is_enclosed(expr: &str) -> bool {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut in_quotes = false;
    for (idx, c) in expr.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth = depth.saturating_sub(1);
                if depth == 0 && idx != expr.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
