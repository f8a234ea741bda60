//! Boolean query model shared by every provider.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sort order for provider pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Searchable fields. The set is closed; anything else is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Text,
    Title,
    Abstract,
    Author,
    Category,
    Journal,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Text,
        Field::Title,
        Field::Abstract,
        Field::Author,
        Field::Category,
        Field::Journal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Text => "TEXT",
            Field::Title => "TITLE",
            Field::Abstract => "ABSTRACT",
            Field::Author => "AUTHOR",
            Field::Category => "CATEGORY",
            Field::Journal => "JOURNAL",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == upper)
            .ok_or_else(|| QueryError::UnknownField(s.to_string()))
    }
}

/// Errors raised while reading a query definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown query field '{0}' (expected one of TEXT, TITLE, ABSTRACT, AUTHOR, CATEGORY, JOURNAL)")]
    UnknownField(String),

    #[error("Unknown operator '{operator}' for field {field} (expected AND, OR or NOT)")]
    UnknownOperator { field: String, operator: String },

    #[error("Invalid terms for {0}: expected a string or a list of strings")]
    InvalidTerms(String),

    #[error("Query definition must be a table, got {0}")]
    NotATable(String),
}

/// AND / OR / NOT term lists for a single field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldQuery {
    pub and: Vec<String>,
    pub or: Vec<String>,
    pub not: Vec<String>,
}

impl FieldQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.and.extend(clean_terms(terms));
        self
    }

    pub fn or<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.or.extend(clean_terms(terms));
        self
    }

    pub fn not<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not.extend(clean_terms(terms));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty() && self.not.is_empty()
    }

    /// Positive terms (AND then OR), in declaration order
    pub fn positive_terms(&self) -> impl Iterator<Item = &str> {
        self.and.iter().chain(self.or.iter()).map(String::as_str)
    }
}

fn clean_terms<I, S>(terms: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    terms.into_iter().filter_map(|t| {
        let t = t.into();
        let trimmed = t.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// A named boolean query: field -> operator -> terms.
///
/// Loaded from configuration tables such as
/// `{ NAME = "cv", TEXT = { OR = ["deep learning"], NOT = ["survey"] } }`.
/// Top-level `AND`/`OR`/`NOT` keys are shorthand for the `TEXT` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct BooleanQuery {
    pub name: Option<String>,
    fields: BTreeMap<Field, FieldQuery>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Merge terms into `field`. Empty term lists are dropped.
    pub fn field(mut self, field: Field, query: FieldQuery) -> Self {
        let entry = self.fields.entry(field).or_default();
        entry.and.extend(query.and);
        entry.or.extend(query.or);
        entry.not.extend(query.not);
        if entry.is_empty() {
            self.fields.remove(&field);
        }
        self
    }

    pub fn get(&self, field: Field) -> Option<&FieldQuery> {
        self.fields.get(&field)
    }

    /// Fields in canonical order
    pub fn fields(&self) -> impl Iterator<Item = (Field, &FieldQuery)> {
        self.fields.iter().map(|(f, q)| (*f, q))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Display label: the configured name, else a compact rendering of the terms
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let parts: Vec<String> = self
            .fields()
            .map(|(field, q)| {
                let terms: Vec<&str> = q.positive_terms().collect();
                format!("{}:{}", field, terms.join("|"))
            })
            .collect();
        if parts.is_empty() {
            "<all>".to_string()
        } else {
            parts.join(" ")
        }
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, QueryError> {
        let table = value
            .as_object()
            .ok_or_else(|| QueryError::NotATable(value.to_string()))?;

        let mut query = BooleanQuery::new();
        let mut shorthand = serde_json::Map::new();

        for (key, val) in table {
            let upper = key.trim().to_uppercase();
            match upper.as_str() {
                "NAME" => {
                    query.name = val.as_str().map(|s| s.trim().to_string());
                }
                "AND" | "OR" | "NOT" => {
                    shorthand.insert(upper, val.clone());
                }
                _ => {
                    let field: Field = key.parse()?;
                    let fq = parse_field_query(field, val)?;
                    query = query.field(field, fq);
                }
            }
        }

        if !shorthand.is_empty() {
            let fq = parse_field_query(Field::Text, &serde_json::Value::Object(shorthand))?;
            query = query.field(Field::Text, fq);
        }

        Ok(query)
    }
}

impl TryFrom<serde_json::Value> for BooleanQuery {
    type Error = QueryError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        BooleanQuery::from_value(&value)
    }
}

fn parse_field_query(field: Field, value: &serde_json::Value) -> Result<FieldQuery, QueryError> {
    let ops = value
        .as_object()
        .ok_or_else(|| QueryError::InvalidTerms(field.to_string()))?;

    let mut fq = FieldQuery::new();
    for (op, terms) in ops {
        let terms = parse_terms(field, terms)?;
        match op.trim().to_uppercase().as_str() {
            "AND" => fq = fq.and(terms),
            "OR" => fq = fq.or(terms),
            "NOT" => fq = fq.not(terms),
            _ => {
                return Err(QueryError::UnknownOperator {
                    field: field.to_string(),
                    operator: op.clone(),
                })
            }
        }
    }
    Ok(fq)
}

fn parse_terms(field: Field, value: &serde_json::Value) -> Result<Vec<String>, QueryError> {
    match value {
        serde_json::Value::String(s) => Ok(vec![s.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| QueryError::InvalidTerms(field.to_string()))
            })
            .collect(),
        _ => Err(QueryError::InvalidTerms(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fields_and_operators() {
        let query = BooleanQuery::from_value(&json!({
            "NAME": "vision",
            "TEXT": {"OR": ["deep learning", "  "], "NOT": "survey"},
            "category": {"or": ["cs.CV"]}
        }))
        .unwrap();

        assert_eq!(query.name.as_deref(), Some("vision"));
        let text = query.get(Field::Text).unwrap();
        assert_eq!(text.or, vec!["deep learning"]);
        assert_eq!(text.not, vec!["survey"]);
        assert_eq!(query.get(Field::Category).unwrap().or, vec!["cs.CV"]);
    }

    #[test]
    fn test_top_level_operators_map_to_text() {
        let query = BooleanQuery::from_value(&json!({"OR": ["graph"], "NOT": ["review"]})).unwrap();
        let text = query.get(Field::Text).unwrap();
        assert_eq!(text.or, vec!["graph"]);
        assert_eq!(text.not, vec!["review"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = BooleanQuery::from_value(&json!({"VENUE": {"OR": ["x"]}})).unwrap_err();
        assert_eq!(err, QueryError::UnknownField("VENUE".to_string()));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = BooleanQuery::from_value(&json!({"TITLE": {"XOR": ["x"]}})).unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator { .. }));
    }

    #[test]
    fn test_invalid_terms_rejected() {
        let err = BooleanQuery::from_value(&json!({"TITLE": {"OR": [1, 2]}})).unwrap_err();
        assert_eq!(err, QueryError::InvalidTerms("TITLE".to_string()));
    }

    #[test]
    fn test_empty_field_is_dropped() {
        let query = BooleanQuery::from_value(&json!({"TITLE": {"OR": [" "]}})).unwrap();
        assert!(query.is_empty());
        assert_eq!(query.label(), "<all>");
    }

    #[test]
    fn test_deserialize_via_serde() {
        let query: BooleanQuery =
            serde_json::from_str(r#"{"AUTHOR": {"AND": ["Hinton"]}}"#).unwrap();
        assert_eq!(query.get(Field::Author).unwrap().and, vec!["Hinton"]);
        assert_eq!(query.label(), "AUTHOR:Hinton");
    }
}
