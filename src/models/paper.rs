//! Paper model representing a research paper from any source.

use chrono::{DateTime, Datelike, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// The source/repository where the paper was found
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Arxiv,
    CrossRef,
    #[serde(untagged)]
    Other(String),
}

impl SourceType {
    /// Returns the display name of the source
    pub fn name(&self) -> &str {
        match self {
            SourceType::Arxiv => "arXiv",
            SourceType::CrossRef => "CrossRef",
            SourceType::Other(s) => s,
        }
    }

    /// Returns the source identifier used for persistence and priority lookup
    pub fn id(&self) -> &str {
        match self {
            SourceType::Arxiv => "arxiv",
            SourceType::CrossRef => "crossref",
            SourceType::Other(s) => s,
        }
    }

    /// Resolve a source identifier back into a `SourceType`
    pub fn from_id(id: &str) -> Self {
        match id {
            "arxiv" => SourceType::Arxiv,
            "crossref" => SourceType::CrossRef,
            other => SourceType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Provider-specific metadata attached to a paper.
///
/// Keys keep their insertion order. The map is shared between clones and
/// cannot be mutated in place; [`Extensions::with`] returns a new map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions(Arc<Vec<(String, serde_json::Value)>>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this map with `key` set to `value`. An existing key keeps its position.
    pub fn with(&self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let key = key.into();
        let mut entries = Arc::clone(&self.0);
        let entries_mut = Arc::make_mut(&mut entries);
        match entries_mut.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries_mut.push((key, value)),
        }
        Self(entries)
    }
}

impl Serialize for Extensions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Links associated with a paper
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaperLinks {
    /// Landing / abstract page
    pub abstract_url: Option<String>,
    /// Direct PDF URL
    pub pdf_url: Option<String>,
}

/// A research paper from any academic source
///
/// Papers are values: once built they are only read, and metadata changes go
/// through [`Paper::with_extension`], which returns a new paper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paper {
    /// Source-local identifier (arXiv ID, DOI, landing URL, ...)
    pub paper_id: String,

    /// Source where the paper was found
    pub source: SourceType,

    /// Paper title
    pub title: String,

    /// Author names, in byline order
    pub authors: Vec<String>,

    /// Abstract text
    pub r#abstract: String,

    /// Digital Object Identifier, as reported by the source
    pub doi: Option<String>,

    pub published: Option<DateTime<Utc>>,

    pub updated: Option<DateTime<Utc>>,

    pub primary_category: Option<String>,

    pub categories: Vec<String>,

    pub links: PaperLinks,

    /// Source-specific metadata
    pub extra: Extensions,
}

impl Paper {
    /// Create a new paper with required fields
    pub fn new(paper_id: String, title: String, source: SourceType) -> Self {
        Self {
            paper_id,
            source,
            title,
            authors: Vec::new(),
            r#abstract: String::new(),
            doi: None,
            published: None,
            updated: None,
            primary_category: None,
            categories: Vec::new(),
            links: PaperLinks::default(),
            extra: Extensions::new(),
        }
    }

    /// Recency timestamp: last update, else publication
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated.or(self.published)
    }

    /// Publication year, falling back to the update year
    pub fn year(&self) -> Option<i32> {
        self.published.or(self.updated).map(|d| d.year())
    }

    /// Returns the identity pair used by the persistent store
    pub fn identity(&self) -> (&str, &str) {
        (self.source.id(), &self.paper_id)
    }

    /// Returns a copy of this paper with one extension entry set
    pub fn with_extension(&self, key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut paper = self.clone();
        paper.extra = self.extra.with(key, value);
        paper
    }
}

/// Builder for constructing Paper objects
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    /// Create a new builder with required fields
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>, source: SourceType) -> Self {
        Self {
            paper: Paper::new(paper_id.into(), title.into(), source),
        }
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paper.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.paper.r#abstract = abstract_text.into();
        self
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.paper.doi = Some(doi.into());
        self
    }

    pub fn published(mut self, date: DateTime<Utc>) -> Self {
        self.paper.published = Some(date);
        self
    }

    pub fn updated(mut self, date: DateTime<Utc>) -> Self {
        self.paper.updated = Some(date);
        self
    }

    pub fn primary_category(mut self, category: impl Into<String>) -> Self {
        self.paper.primary_category = Some(category.into());
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paper.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn abstract_url(mut self, url: impl Into<String>) -> Self {
        self.paper.links.abstract_url = Some(url.into());
        self
    }

    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        self.paper.links.pdf_url = Some(url.into());
        self
    }

    /// Add extra metadata
    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.paper.extra = self.paper.extra.with(key, value);
        self
    }

    /// Build the Paper
    pub fn build(self) -> Paper {
        self.paper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paper_builder() {
        let paper = PaperBuilder::new("2401.00001", "Test Paper", SourceType::Arxiv)
            .authors(["John Doe", "Jane Smith"])
            .abstract_text("This is a test abstract.")
            .doi("10.1234/test.1234")
            .pdf_url("https://arxiv.org/pdf/2401.00001")
            .build();

        assert_eq!(paper.paper_id, "2401.00001");
        assert_eq!(paper.title, "Test Paper");
        assert_eq!(paper.authors, vec!["John Doe", "Jane Smith"]);
        assert_eq!(paper.doi.as_deref(), Some("10.1234/test.1234"));
        assert_eq!(paper.identity(), ("arxiv", "2401.00001"));
    }

    #[test]
    fn test_timestamp_prefers_updated() {
        let published = Utc.with_ymd_and_hms(2023, 12, 30, 0, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();

        let paper = PaperBuilder::new("1", "T", SourceType::Arxiv)
            .published(published)
            .updated(updated)
            .build();
        assert_eq!(paper.timestamp(), Some(updated));
        assert_eq!(paper.year(), Some(2023));

        let only_published = PaperBuilder::new("2", "T", SourceType::Arxiv)
            .published(published)
            .build();
        assert_eq!(only_published.timestamp(), Some(published));

        let undated = PaperBuilder::new("3", "T", SourceType::Arxiv).build();
        assert_eq!(undated.timestamp(), None);
        assert_eq!(undated.year(), None);
    }

    #[test]
    fn test_extensions_keep_order_and_copy_on_write() {
        let paper = PaperBuilder::new("1", "T", SourceType::CrossRef)
            .extra("publisher", serde_json::json!("ACM"))
            .extra("type", serde_json::json!("journal-article"))
            .build();

        let updated = paper.with_extension("publisher", serde_json::json!("IEEE"));

        assert_eq!(paper.extra.get("publisher"), Some(&serde_json::json!("ACM")));
        assert_eq!(updated.extra.get("publisher"), Some(&serde_json::json!("IEEE")));
        let keys: Vec<&str> = updated.extra.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["publisher", "type"]);
    }

    #[test]
    fn test_extensions_serialize_as_map() {
        let ext = Extensions::new()
            .with("b", serde_json::json!(1))
            .with("a", serde_json::json!(2));
        let json = serde_json::to_string(&ext).unwrap();
        assert_eq!(json, r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn test_source_type_ids() {
        assert_eq!(SourceType::Arxiv.id(), "arxiv");
        assert_eq!(SourceType::from_id("crossref"), SourceType::CrossRef);
        assert_eq!(SourceType::from_id("zbmath"), SourceType::Other("zbmath".to_string()));
        assert_eq!(SourceType::CrossRef.to_string(), "CrossRef");
    }
}
