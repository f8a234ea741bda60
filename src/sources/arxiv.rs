//! arXiv research source implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::fetch::{PageRequest, PageSource, TimeWindowedFetch};
use crate::models::{BooleanQuery, FetchPolicy, Paper, PaperBuilder, SortOrder, SourceType};
use crate::query::{ArxivQueryCompiler, CompiledQuery, QueryCompiler};
use crate::sources::{FeedParser, Source, SourceError};
use crate::storage::DedupStore;
use crate::utils::{arxiv_retry_config, FetcherOptions, RetryConfig, RetryingFetcher};

/// Primary endpoint first, plain-HTTP fallback second
pub const ARXIV_API_ENDPOINTS: [&str; 2] = [
    "https://export.arxiv.org/api/query",
    "http://export.arxiv.org/api/query",
];

const ATOM_ACCEPT: &str = "application/atom+xml,application/xml;q=0.9,*/*;q=0.8";

static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v\d+$").expect("version regex is valid"));

/// arXiv research source
///
/// Queries the arXiv Atom export API sorted by last update, newest first.
#[derive(Debug)]
pub struct ArxivSource {
    compiler: ArxivQueryCompiler,
    fetcher: RetryingFetcher,
    parser: ArxivFeedParser,
    strategy: TimeWindowedFetch,
    scope: Option<BooleanQuery>,
    store: Option<Arc<dyn DedupStore>>,
}

impl ArxivSource {
    pub fn new(policy: FetchPolicy) -> Result<Self, SourceError> {
        Self::with_endpoints(
            ARXIV_API_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            arxiv_retry_config(),
            policy,
        )
    }

    /// Build against custom endpoints, e.g. a mirror or a test server
    pub fn with_endpoints(
        endpoints: Vec<String>,
        retry: RetryConfig,
        policy: FetchPolicy,
    ) -> Result<Self, SourceError> {
        let options = FetcherOptions {
            timeout: std::time::Duration::from_secs(45),
            accept: Some(ATOM_ACCEPT.to_string()),
            ..Default::default()
        };
        Ok(Self {
            compiler: ArxivQueryCompiler::new(),
            fetcher: RetryingFetcher::new("arxiv", endpoints, retry, options)?,
            parser: ArxivFeedParser::default(),
            strategy: TimeWindowedFetch::new(policy),
            scope: None,
            store: None,
        })
    }

    /// Global scope intersected with every query
    pub fn with_scope(mut self, scope: Option<BooleanQuery>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DedupStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_strategy(mut self, strategy: TimeWindowedFetch) -> Self {
        self.strategy = strategy;
        self
    }

    /// Keep the `vN` suffix on identifiers instead of stripping it
    pub fn keep_version(mut self, keep: bool) -> Self {
        self.parser = ArxivFeedParser { keep_version: keep };
        self
    }
}

#[async_trait]
impl PageSource for ArxivSource {
    async fn fetch_page(
        &self,
        query: &CompiledQuery,
        request: PageRequest,
    ) -> Result<Vec<Paper>, SourceError> {
        let mut params = query.params.clone();
        params.push(("start".to_string(), request.offset.to_string()));
        params.push(("max_results".to_string(), request.size.to_string()));
        params.push(("sortBy".to_string(), "lastUpdatedDate".to_string()));
        let order = match request.sort {
            SortOrder::Descending => "descending",
            SortOrder::Ascending => "ascending",
        };
        params.push(("sortOrder".to_string(), order.to_string()));

        let payload = self.fetcher.fetch(&params).await?;
        self.parser.parse(&payload)
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    async fn search(&self, query: &BooleanQuery, limit: usize) -> Result<Vec<Paper>, SourceError> {
        let compiled = self.compiler.compile(query, self.scope.as_ref())?;
        tracing::info!("arXiv search [{}]: {}", query.label(), compiled);

        self.strategy
            .collect(&compiled, self, self.store.as_deref(), limit)
            .await
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.fetcher.close()
    }
}

/// Parser for arXiv Atom feeds
#[derive(Debug, Clone, Default)]
pub struct ArxivFeedParser {
    /// Keep the version suffix on identifiers
    pub keep_version: bool,
}

impl ArxivFeedParser {
    /// Extract the identifier from an entry id such as `http://arxiv.org/abs/2401.00001v2`
    pub fn parse_id(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        let id = match raw.find("/abs/") {
            Some(pos) => &raw[pos + 5..],
            None => raw.strip_prefix("arxiv:").unwrap_or(raw),
        };
        if id.is_empty() {
            return None;
        }
        if self.keep_version {
            Some(id.to_string())
        } else {
            Some(VERSION_SUFFIX.replace(id, "").into_owned())
        }
    }
}

/// Fields of one `<entry>` collected while streaming
#[derive(Debug, Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    authors: Vec<String>,
    categories: Vec<String>,
    primary_category: Option<String>,
    doi: Option<String>,
    comment: Option<String>,
    journal_ref: Option<String>,
    abstract_url: Option<String>,
    pdf_url: Option<String>,
}

impl EntryFields {
    fn apply_empty(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"link" => {
                let href = attr(e, b"href");
                let title = attr(e, b"title");
                let rel = attr(e, b"rel");
                let kind = attr(e, b"type");
                if title.as_deref() == Some("pdf") || kind.as_deref() == Some("application/pdf") {
                    self.pdf_url = href;
                } else if rel.as_deref() == Some("alternate") {
                    self.abstract_url = href;
                }
            }
            b"category" => {
                if let Some(term) = attr(e, b"term") {
                    self.categories.push(term);
                }
            }
            b"primary_category" => {
                self.primary_category = attr(e, b"term");
            }
            _ => {}
        }
    }

    fn apply_text(&mut self, element: &[u8], in_author: bool, text: &str) {
        match element {
            b"id" => self.id.push_str(text),
            b"title" => self.title.push_str(text),
            b"summary" => self.summary.push_str(text),
            b"published" => self.published.push_str(text),
            b"updated" => self.updated.push_str(text),
            b"name" if in_author => {
                if let Some(last) = self.authors.last_mut() {
                    last.push_str(text);
                }
            }
            b"doi" => self.doi.get_or_insert_with(String::new).push_str(text),
            b"comment" => self.comment.get_or_insert_with(String::new).push_str(text),
            b"journal_ref" => self.journal_ref.get_or_insert_with(String::new).push_str(text),
            _ => {}
        }
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

impl ArxivFeedParser {
    fn build(&self, entry: EntryFields) -> Result<Option<Paper>, SourceError> {
        // The API reports malformed queries as a single error entry.
        if entry.id.contains("/api/errors") {
            return Err(SourceError::Api {
                status: 400,
                message: collapse(&entry.summary),
            });
        }

        let Some(paper_id) = self.parse_id(&entry.id) else {
            tracing::debug!("Skipping arXiv entry without id");
            return Ok(None);
        };

        let mut builder = PaperBuilder::new(paper_id, collapse(&entry.title), SourceType::Arxiv)
            .authors(entry.authors.iter().map(|a| collapse(a)).filter(|a| !a.is_empty()))
            .abstract_text(collapse(&entry.summary))
            .categories(entry.categories);

        if let Some(ts) = parse_timestamp(&entry.published) {
            builder = builder.published(ts);
        }
        if let Some(ts) = parse_timestamp(&entry.updated) {
            builder = builder.updated(ts);
        }
        if let Some(primary) = entry.primary_category {
            builder = builder.primary_category(primary);
        }
        if let Some(doi) = entry.doi.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
            builder = builder.doi(doi);
        }
        let abstract_url = entry.abstract_url.unwrap_or_else(|| entry.id.trim().to_string());
        builder = builder.abstract_url(abstract_url);
        if let Some(pdf) = entry.pdf_url {
            builder = builder.pdf_url(pdf);
        }
        if let Some(comment) = entry.comment {
            builder = builder.extra("comment", serde_json::Value::String(collapse(&comment)));
        }
        if let Some(journal_ref) = entry.journal_ref {
            builder = builder.extra(
                "journal_ref",
                serde_json::Value::String(collapse(&journal_ref)),
            );
        }

        Ok(Some(builder.build()))
    }
}

impl FeedParser for ArxivFeedParser {
    fn parse(&self, payload: &str) -> Result<Vec<Paper>, SourceError> {
        let mut reader = Reader::from_str(payload);
        let mut papers = Vec::new();
        let mut entry: Option<EntryFields> = None;
        let mut element: Vec<u8> = Vec::new();
        let mut in_author = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"entry" {
                        entry = Some(EntryFields::default());
                    } else if let Some(current) = entry.as_mut() {
                        if name == b"author" {
                            in_author = true;
                            current.authors.push(String::new());
                        } else {
                            current.apply_empty(&e);
                        }
                    }
                    element = name;
                }
                Event::Empty(e) => {
                    if let Some(current) = entry.as_mut() {
                        current.apply_empty(&e);
                    }
                }
                Event::Text(t) => {
                    if let Some(current) = entry.as_mut() {
                        let text = t.unescape()?;
                        current.apply_text(&element, in_author, &text);
                    }
                }
                Event::CData(t) => {
                    if let Some(current) = entry.as_mut() {
                        let text = String::from_utf8_lossy(&t).into_owned();
                        current.apply_text(&element, in_author, &text);
                    }
                }
                Event::End(e) => {
                    match e.local_name().as_ref() {
                        b"entry" => {
                            if let Some(done) = entry.take() {
                                if let Some(paper) = self.build(done)? {
                                    papers.push(paper);
                                }
                            }
                        }
                        b"author" => in_author = false,
                        _ => {}
                    }
                    element.clear();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        tracing::debug!("Parsed {} arXiv entries", papers.len());
        Ok(papers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNBOUNDED;
    use mockito::Matcher;
    use std::time::Duration;

    fn feed(entries: &[(&str, DateTime<Utc>)]) -> String {
        let body: String = entries
            .iter()
            .map(|(id, updated)| {
                format!(
                    r#"<entry>
    <id>http://arxiv.org/abs/{id}v2</id>
    <updated>{updated}</updated>
    <published>{updated}</published>
    <title>Paper {id}</title>
    <summary>Abstract of {id}</summary>
    <author><name>Ada Lovelace</name></author>
    <link href="http://arxiv.org/abs/{id}v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/{id}v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>"#,
                    id = id,
                    updated = updated.to_rfc3339()
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
  {body}
</feed>"#
        )
    }

    #[test]
    fn test_parse_full_entry() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/2401.01234v3</id>
    <updated>2024-01-09T12:00:00Z</updated>
    <published>2024-01-02T08:30:00Z</published>
    <title>Diffusion
      Models &amp; Friends</title>
    <summary>  We study
      diffusion.  </summary>
    <author><name>Jane Doe</name></author>
    <author><name>John Roe</name></author>
    <arxiv:doi>10.1000/xyz123</arxiv:doi>
    <arxiv:comment>12 pages</arxiv:comment>
    <link href="http://arxiv.org/abs/2401.01234v3" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.01234v3" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

        let papers = ArxivFeedParser::default().parse(xml).unwrap();
        assert_eq!(papers.len(), 1);
        let p = &papers[0];
        assert_eq!(p.paper_id, "2401.01234");
        assert_eq!(p.title, "Diffusion Models & Friends");
        assert_eq!(p.r#abstract, "We study diffusion.");
        assert_eq!(p.authors, vec!["Jane Doe", "John Roe"]);
        assert_eq!(p.doi.as_deref(), Some("10.1000/xyz123"));
        assert_eq!(p.primary_category.as_deref(), Some("cs.CV"));
        assert_eq!(p.categories, vec!["cs.CV", "cs.LG"]);
        assert_eq!(p.links.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2401.01234v3"));
        assert_eq!(
            p.links.abstract_url.as_deref(),
            Some("http://arxiv.org/abs/2401.01234v3")
        );
        assert_eq!(p.updated.unwrap().to_rfc3339(), "2024-01-09T12:00:00+00:00");
        assert_eq!(p.extra.get("comment"), Some(&serde_json::json!("12 pages")));
    }

    #[test]
    fn test_parse_id_variants() {
        let parser = ArxivFeedParser::default();
        assert_eq!(parser.parse_id("http://arxiv.org/abs/2401.00001v1").as_deref(), Some("2401.00001"));
        assert_eq!(parser.parse_id("http://arxiv.org/abs/hep-th/9901001v2").as_deref(), Some("hep-th/9901001"));
        assert_eq!(parser.parse_id("arxiv:2401.00001").as_deref(), Some("2401.00001"));
        assert_eq!(parser.parse_id("  "), None);

        let keep = ArxivFeedParser { keep_version: true };
        assert_eq!(keep.parse_id("http://arxiv.org/abs/2401.00001v4").as_deref(), Some("2401.00001v4"));
    }

    #[test]
    fn test_error_entry_is_reported() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
  </entry>
</feed>"#;
        let err = ArxivFeedParser::default().parse(xml).unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 400, .. }));
    }

    #[test]
    fn test_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;
        assert!(ArxivFeedParser::default().parse(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = ArxivFeedParser::default()
            .parse("<feed><entry><id>x</entry></feed>")
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_search_with_mockito_integration() {
        let now = Utc::now();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search_query".into(), "cat:cs.LG".into()),
                Matcher::UrlEncoded("start".into(), "0".into()),
                Matcher::UrlEncoded("max_results".into(), "10".into()),
                Matcher::UrlEncoded("sortBy".into(), "lastUpdatedDate".into()),
                Matcher::UrlEncoded("sortOrder".into(), "descending".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(feed(&[
                ("2401.00002", now - chrono::Duration::hours(2)),
                ("2401.00001", now - chrono::Duration::hours(5)),
            ]))
            .expect(1)
            .create_async()
            .await;

        let policy = FetchPolicy {
            max_results: 2,
            fetch_batch_size: 10,
            max_fetch_items: UNBOUNDED,
            ..Default::default()
        };
        let source = ArxivSource::with_endpoints(
            vec![format!("{}/api/query", server.url())],
            RetryConfig::immediate(2),
            policy.clone(),
        )
        .unwrap()
        .with_strategy(TimeWindowedFetch::new(policy).with_page_delay(Duration::ZERO));

        let query = BooleanQuery::new().field(
            crate::models::Field::Category,
            crate::models::FieldQuery::new().or(["cs.LG"]),
        );
        let papers = source.search(&query, 10).await.unwrap();

        mock.assert_async().await;
        let ids: Vec<&str> = papers.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["2401.00002", "2401.00001"]);
        assert!(papers.iter().all(|p| p.source == SourceType::Arxiv));

        source.close().await.unwrap();
        assert!(matches!(
            source.search(&query, 10).await,
            Err(SourceError::Closed)
        ));
    }
}
