//! CrossRef research source implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::{Arc, LazyLock};

use crate::fetch::{PageRequest, PageSource, TimeWindowedFetch};
use crate::models::{BooleanQuery, FetchPolicy, Paper, PaperBuilder, SortOrder, SourceType};
use crate::query::{CompiledQuery, CrossRefQueryCompiler, QueryCompiler};
use crate::sources::{FeedParser, Source, SourceError};
use crate::storage::DedupStore;
use crate::utils::{crossref_retry_config, FetcherOptions, RetryConfig, RetryingFetcher};

pub const CROSSREF_WORKS_URL: &str = "https://api.crossref.org/works";

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex is valid"));

/// CrossRef research source
///
/// Uses the CrossRef REST API `/works` endpoint sorted by update time.
#[derive(Debug)]
pub struct CrossRefSource {
    compiler: CrossRefQueryCompiler,
    fetcher: RetryingFetcher,
    parser: CrossRefParser,
    strategy: TimeWindowedFetch,
    scope: Option<BooleanQuery>,
    store: Option<Arc<dyn DedupStore>>,
    mailto: Option<String>,
}

impl CrossRefSource {
    pub fn new(policy: FetchPolicy) -> Result<Self, SourceError> {
        Self::with_endpoint(CROSSREF_WORKS_URL, crossref_retry_config(), policy)
    }

    pub fn with_endpoint(
        endpoint: impl Into<String>,
        retry: RetryConfig,
        policy: FetchPolicy,
    ) -> Result<Self, SourceError> {
        let options = FetcherOptions {
            accept: Some("application/json".to_string()),
            ..Default::default()
        };
        Ok(Self {
            compiler: CrossRefQueryCompiler::new(),
            fetcher: RetryingFetcher::new("crossref", vec![endpoint.into()], retry, options)?,
            parser: CrossRefParser,
            strategy: TimeWindowedFetch::new(policy),
            scope: None,
            store: None,
            mailto: None,
        })
    }

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

    /// Contact address sent as `mailto`, which routes requests to Crossref's polite pool
    pub fn with_mailto(mut self, mailto: Option<String>) -> Self {
        self.mailto = mailto.filter(|m| !m.trim().is_empty());
        self
    }
}

#[async_trait]
impl PageSource for CrossRefSource {
    async fn fetch_page(
        &self,
        query: &CompiledQuery,
        request: PageRequest,
    ) -> Result<Vec<Paper>, SourceError> {
        let mut params = query.params.clone();
        params.push(("rows".to_string(), request.size.to_string()));
        params.push(("offset".to_string(), request.offset.to_string()));
        params.push(("sort".to_string(), "updated".to_string()));
        let order = match request.sort {
            SortOrder::Descending => "desc",
            SortOrder::Ascending => "asc",
        };
        params.push(("order".to_string(), order.to_string()));
        if let Some(mailto) = &self.mailto {
            params.push(("mailto".to_string(), mailto.clone()));
        }

        let payload = self.fetcher.fetch(&params).await?;
        self.parser.parse(&payload)
    }
}

#[async_trait]
impl Source for CrossRefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "CrossRef"
    }

    async fn search(&self, query: &BooleanQuery, limit: usize) -> Result<Vec<Paper>, SourceError> {
        let compiled = self.compiler.compile(query, self.scope.as_ref())?;
        tracing::info!("CrossRef search [{}]: {}", query.label(), compiled);

        self.strategy
            .collect(&compiled, self, self.store.as_deref(), limit)
            .await
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.fetcher.close()
    }
}

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRMessage,
}

#[derive(Debug, Default, Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<CRItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    container_title: Vec<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    publisher: Option<String>,
    published_print: Option<CRDate>,
    published_online: Option<CRDate>,
    issued: Option<CRDate>,
    created: Option<CRDate>,
    updated: Option<CRDate>,
    indexed: Option<CRDate>,
}

#[derive(Debug, Default, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl CRAuthor {
    fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.given.as_deref(), self.family.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
        non_empty(self.name.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
struct CRDate {
    #[serde(rename = "date-time")]
    date_time: Option<String>,
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i64>>>,
}

impl CRDate {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.date_time.as_deref().and_then(parse_iso) {
            return Some(ts);
        }
        let parts = self.date_parts.first()?;
        let year = i32::try_from((*parts.first()?)?).ok()?;
        let month = match parts.get(1) {
            Some(Some(m)) => u32::try_from(*m).ok().filter(|m| (1..=12).contains(m))?,
            Some(None) => return None,
            None => 1,
        };
        let day = match parts.get(2) {
            Some(Some(d)) => u32::try_from(*d).ok().filter(|d| (1..=31).contains(d))?,
            Some(None) => return None,
            None => 1,
        };
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    fn year(&self) -> Option<i64> {
        self.date_parts.first().and_then(|p| p.first().copied().flatten())
    }
}

fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn first_date(dates: [&Option<CRDate>; 4]) -> Option<DateTime<Utc>> {
    dates
        .into_iter()
        .flatten()
        .find_map(|d| d.to_datetime())
}

fn clean_abstract(raw: &str) -> String {
    TAG.replace_all(raw, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parser for CrossRef `/works` JSON payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossRefParser;

impl CrossRefParser {
    /// DOI (lower-cased), else landing URL, else a digest of title, year and first author
    fn source_id(item: &CRItem, title: &str) -> String {
        if let Some(doi) = non_empty(item.doi.as_deref()) {
            return doi.to_lowercase();
        }
        if let Some(url) = non_empty(item.url.as_deref()) {
            return url;
        }

        let year = [&item.issued, &item.published_print, &item.published_online, &item.created]
            .into_iter()
            .flatten()
            .find_map(CRDate::year)
            .map(|y| y.to_string())
            .unwrap_or_default();
        let author_hint = item
            .author
            .first()
            .and_then(|a| non_empty(a.family.as_deref()).or_else(|| non_empty(a.name.as_deref())))
            .unwrap_or_default();

        let signature = format!(
            "{}|{}|{}",
            title.to_lowercase(),
            year,
            author_hint.to_lowercase()
        );
        let digest = format!("{:x}", Sha256::digest(signature.as_bytes()));
        format!("crossref:{}", &digest[..16])
    }

    fn build(item: CRItem) -> Paper {
        let title = item
            .title
            .iter()
            .find_map(|t| non_empty(Some(t.as_str())))
            .unwrap_or_else(|| "Untitled".to_string());
        let source_id = Self::source_id(&item, &title);

        let published = first_date([
            &item.published_print,
            &item.published_online,
            &item.issued,
            &item.created,
        ]);
        let updated = first_date([&item.updated, &item.indexed, &item.created, &item.issued]);

        let subjects: Vec<String> = item
            .subject
            .iter()
            .filter_map(|s| non_empty(Some(s.as_str())))
            .collect();

        let mut builder = PaperBuilder::new(source_id, title, SourceType::CrossRef)
            .authors(item.author.iter().filter_map(CRAuthor::display_name))
            .abstract_text(clean_abstract(item.abstract_text.as_deref().unwrap_or_default()))
            .categories(subjects.clone());

        if let Some(primary) = subjects.into_iter().next() {
            builder = builder.primary_category(primary);
        }
        if let Some(ts) = published {
            builder = builder.published(ts);
        }
        if let Some(ts) = updated {
            builder = builder.updated(ts);
        }
        if let Some(doi) = non_empty(item.doi.as_deref()) {
            builder = builder.doi(doi);
        }
        if let Some(url) = non_empty(item.url.as_deref()) {
            builder = builder.abstract_url(url);
        }
        let container = item
            .container_title
            .iter()
            .find_map(|c| non_empty(Some(c.as_str())));
        if let Some(container) = container {
            builder = builder.extra("container_title", serde_json::Value::String(container));
        }
        if let Some(publisher) = non_empty(item.publisher.as_deref()) {
            builder = builder.extra("publisher", serde_json::Value::String(publisher));
        }
        if let Some(kind) = non_empty(item.kind.as_deref()) {
            builder = builder.extra("type", serde_json::Value::String(kind));
        }

        builder.build()
    }
}

impl FeedParser for CrossRefParser {
    fn parse(&self, payload: &str) -> Result<Vec<Paper>, SourceError> {
        let response: CRResponse = serde_json::from_str(payload)?;
        let papers: Vec<Paper> = response.message.items.into_iter().map(Self::build).collect();
        tracing::debug!("Parsed {} CrossRef items", papers.len());
        Ok(papers)
    }
}
