//! Integration tests for Paper Tracker
//!
//! These tests drive the public API end to end: providers against local
//! mock HTTP servers, the SQLite stores, and the aggregation service.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use paper_tracker::models::{BooleanQuery, FetchPolicy, Field, FieldQuery, PaperBuilder, SourceType};
use paper_tracker::services::{AggregationService, SearchError};
use paper_tracker::sources::{MockSource, Source};
use paper_tracker::storage::{Database, DedupStore, ReadOnlyDedupStore, SqliteDedupStore};
use std::sync::Arc;

fn query() -> BooleanQuery {
    BooleanQuery::new()
        .named("graphs")
        .field(Field::Text, FieldQuery::new().or(["graph neural network"]))
}

fn policy(target: usize) -> FetchPolicy {
    FetchPolicy {
        max_results: target,
        fetch_batch_size: 10,
        max_fetch_items: 100,
        ..Default::default()
    }
}

fn arxiv_feed(entries: &[(&str, Option<&str>, DateTime<Utc>)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, doi, updated)| {
            let doi = doi
                .map(|d| format!("<arxiv:doi>{d}</arxiv:doi>"))
                .unwrap_or_default();
            format!(
                r#"<entry>
    <id>http://arxiv.org/abs/{id}v1</id>
    <updated>{updated}</updated>
    <published>{updated}</published>
    <title>Graph Study {id}</title>
    <summary>Abstract {id}</summary>
    <author><name>Grace Hopper</name></author>
    {doi}
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>"#,
                updated = updated.to_rfc3339()
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  {body}
</feed>"#
    )
}

const EMPTY_FEED: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;

fn mock_sources(sources: Vec<Arc<MockSource>>) -> Vec<Arc<dyn Source>> {
    sources.into_iter().map(|s| s as Arc<dyn Source>).collect()
}

#[tokio::test]
async fn test_aggregation_survives_one_failed_provider() {
    let now = Utc::now();
    let primary = Arc::new(MockSource::new("arxiv").failing("connection refused"));
    let secondary = Arc::new(MockSource::new("crossref").with_papers(vec![
        PaperBuilder::new("10.1/a", "First Work On Graphs", SourceType::CrossRef)
            .updated(now)
            .build(),
    ]));

    let service = AggregationService::new(mock_sources(vec![primary, secondary]));
    let papers = service.search(&query(), 10).await.unwrap();

    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0].paper_id, "10.1/a");
}

#[tokio::test]
async fn test_aggregation_fails_when_every_provider_fails() {
    let service = AggregationService::new(mock_sources(vec![
        Arc::new(MockSource::new("arxiv").failing("HTTP 400")),
        Arc::new(MockSource::new("crossref").failing("timeout")),
    ]));

    let err = service.search(&query(), 10).await.unwrap_err();
    assert!(matches!(err, SearchError::AllSourcesFailed(ref f) if f.len() == 2));
}

#[tokio::test]
async fn test_store_identity_is_shared_across_sources() {
    let db = Database::open_in_memory().unwrap();
    let store = SqliteDedupStore::new(&db);

    let arxiv_copy = PaperBuilder::new("2401.00001", "Shared", SourceType::Arxiv)
        .doi("10.5555/Shared")
        .build();
    let crossref_copy = PaperBuilder::new("10.5555/shared", "Shared", SourceType::CrossRef)
        .doi("https://doi.org/10.5555/SHARED")
        .build();

    store.mark_seen(&[arxiv_copy.clone()]).unwrap();
    assert!(store.filter_new(vec![crossref_copy]).unwrap().is_empty());

    // Idempotent
    store.mark_seen(&[arxiv_copy.clone()]).unwrap();
    assert!(store.filter_new(vec![arxiv_copy]).unwrap().is_empty());
    assert_eq!(store.count().unwrap(), 1);
}

#[cfg(feature = "source-arxiv")]
mod arxiv {
    use super::*;
    use mockito::Matcher;
    use paper_tracker::fetch::TimeWindowedFetch;
    use paper_tracker::sources::ArxivSource;
    use paper_tracker::utils::RetryConfig;
    use std::time::Duration;

    async fn serve_feed(server: &mut mockito::ServerGuard, feed: String) -> (mockito::Mock, mockito::Mock) {
        let first = server
            .mock("GET", "/api/query")
            .match_query(Matcher::UrlEncoded("start".into(), "0".into()))
            .with_status(200)
            .with_body(feed)
            .expect_at_least(1)
            .create_async()
            .await;
        let rest = server
            .mock("GET", "/api/query")
            .match_query(Matcher::Regex("start=[1-9]".into()))
            .with_status(200)
            .with_body(EMPTY_FEED)
            .create_async()
            .await;
        (first, rest)
    }

    fn source(server: &mockito::ServerGuard, policy: FetchPolicy) -> ArxivSource {
        ArxivSource::with_endpoints(
            vec![format!("{}/api/query", server.url())],
            RetryConfig::immediate(1),
            policy.clone(),
        )
        .unwrap()
        .with_strategy(TimeWindowedFetch::new(policy).with_page_delay(Duration::ZERO))
    }

    fn service(store: &Arc<dyn DedupStore>, sources: Vec<Arc<dyn Source>>) -> AggregationService {
        AggregationService::new(sources).with_store(Arc::clone(store))
    }

    #[tokio::test]
    async fn test_second_run_returns_only_new_papers() {
        let now = Utc::now();
        let mut server = mockito::Server::new_async().await;
        let (first, _rest) = serve_feed(
            &mut server,
            arxiv_feed(&[
                ("2401.00003", None, now - ChronoDuration::hours(1)),
                ("2401.00002", None, now - ChronoDuration::hours(2)),
                ("2401.00001", None, now - ChronoDuration::hours(3)),
            ]),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("papers.db")).unwrap();
        let store: Arc<dyn DedupStore> = Arc::new(SqliteDedupStore::new(&db));
        let arxiv: Arc<dyn Source> = Arc::new(source(&server, policy(2)).with_store(Arc::clone(&store)));
        let service = service(&store, vec![arxiv]);

        let run1 = service.search(&query(), 10).await.unwrap();
        let ids1: Vec<_> = run1.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids1, vec!["2401.00003", "2401.00002"]);

        // The item cut by truncation was not consumed.
        let run2 = service.search(&query(), 10).await.unwrap();
        let ids2: Vec<_> = run2.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids2, vec!["2401.00001"]);

        let run3 = service.search(&query(), 10).await.unwrap();
        assert!(run3.is_empty());

        first.assert_async().await;
        service.close().await;
        drop(service);
        drop(store);
        db.close().unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_does_not_persist() {
        let now = Utc::now();
        let mut server = mockito::Server::new_async().await;
        let _mocks = serve_feed(
            &mut server,
            arxiv_feed(&[("2401.00010", None, now - ChronoDuration::hours(1))]),
        )
        .await;

        let db = Database::open_in_memory().unwrap();
        let dry: Arc<dyn DedupStore> = Arc::new(ReadOnlyDedupStore::new(&db));
        let arxiv: Arc<dyn Source> = Arc::new(source(&server, policy(5)).with_store(Arc::clone(&dry)));
        let service = service(&dry, vec![arxiv]);

        assert_eq!(service.search(&query(), 10).await.unwrap().len(), 1);
        // Seen within the session
        assert!(service.search(&query(), 10).await.unwrap().is_empty());
        // Never written to the database
        assert_eq!(SqliteDedupStore::new(&db).count().unwrap(), 0);
    }

    #[cfg(feature = "source-crossref")]
    mod crossref {
        use super::*;
        use paper_tracker::sources::CrossRefSource;

        async fn serve_works(server: &mut mockito::ServerGuard, items: String) -> (mockito::Mock, mockito::Mock) {
            let first = server
                .mock("GET", "/works")
                .match_query(Matcher::UrlEncoded("offset".into(), "0".into()))
                .with_status(200)
                .with_body(format!(r#"{{"message": {{"items": [{items}]}}}}"#))
                .create_async()
                .await;
            let rest = server
                .mock("GET", "/works")
                .match_query(Matcher::Regex("offset=[1-9]".into()))
                .with_status(200)
                .with_body(r#"{"message": {"items": []}}"#)
                .create_async()
                .await;
            (first, rest)
        }

        fn work(doi: &str, title: &str, updated: DateTime<Utc>) -> String {
            format!(
                r#"{{"DOI": "{doi}", "title": ["{title}"], "updated": {{"date-time": "{}"}}}}"#,
                updated.to_rfc3339()
            )
        }

        fn crossref_source(
            server: &mockito::ServerGuard,
            policy: FetchPolicy,
            store: &Arc<dyn DedupStore>,
        ) -> Arc<dyn Source> {
            let source = CrossRefSource::with_endpoint(
                format!("{}/works", server.url()),
                RetryConfig::immediate(1),
                policy.clone(),
            )
            .unwrap()
            .with_strategy(TimeWindowedFetch::new(policy).with_page_delay(Duration::ZERO))
            .with_store(Arc::clone(store));
            Arc::new(source)
        }

        #[tokio::test]
        async fn test_arxiv_and_crossref_share_one_store() {
            let now = Utc::now();
            let mut arxiv_server = mockito::Server::new_async().await;
            let _arxiv_mocks = serve_feed(
                &mut arxiv_server,
                arxiv_feed(&[("2401.00020", Some("10.7777/GNN"), now - ChronoDuration::hours(4))]),
            )
            .await;

            let recent = now - ChronoDuration::hours(1);
            let mut crossref_server = mockito::Server::new_async().await;
            let _crossref_mocks = serve_works(
                &mut crossref_server,
                [
                    work("10.7777/gnn", "Graph Study 2401.00020", recent),
                    work("10.8888/other", "Another Graph Paper", recent),
                ]
                .join(","),
            )
            .await;

            let db = Database::open_in_memory().unwrap();
            let store: Arc<dyn DedupStore> = Arc::new(SqliteDedupStore::new(&db));
            let arxiv: Arc<dyn Source> = Arc::new(source(&arxiv_server, policy(5)).with_store(Arc::clone(&store)));
            let crossref = crossref_source(&crossref_server, policy(5), &store);

            let service = service(&store, vec![arxiv, crossref]);
            let papers = service.search(&query(), 10).await.unwrap();
            service.close().await;

            // Both providers return the shared DOI; the arXiv copy wins on priority.
            let ids: Vec<_> = papers.iter().map(|p| p.paper_id.as_str()).collect();
            assert_eq!(ids, vec!["10.8888/other", "2401.00020"]);

            // Either copy is now known to the store.
            let crossref_copy = PaperBuilder::new("10.7777/gnn", "Graph Study", SourceType::CrossRef)
                .doi("10.7777/gnn")
                .build();
            assert!(store.filter_new(vec![crossref_copy]).unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_papers_cut_by_limit_are_returned_next_run() {
            let now = Utc::now();
            let mut arxiv_server = mockito::Server::new_async().await;
            let _arxiv_mocks = serve_feed(
                &mut arxiv_server,
                arxiv_feed(&[("2401.00001", None, now - ChronoDuration::hours(1))]),
            )
            .await;
            let mut crossref_server = mockito::Server::new_async().await;
            let _crossref_mocks = serve_works(
                &mut crossref_server,
                work("10.9999/late", "Another Graph Paper", now - ChronoDuration::hours(2)),
            )
            .await;

            let db = Database::open_in_memory().unwrap();
            let store: Arc<dyn DedupStore> = Arc::new(SqliteDedupStore::new(&db));

            let mut runs = Vec::new();
            for _ in 0..3 {
                let arxiv: Arc<dyn Source> =
                    Arc::new(source(&arxiv_server, policy(5)).with_store(Arc::clone(&store)));
                let crossref = crossref_source(&crossref_server, policy(5), &store);
                let service = service(&store, vec![arxiv, crossref]);
                let papers = service.search(&query(), 1).await.unwrap();
                runs.push(papers.into_iter().map(|p| p.paper_id).collect::<Vec<_>>());
            }

            assert_eq!(runs[0], vec!["2401.00001"]);
            assert_eq!(runs[1], vec!["10.9999/late"]);
            assert!(runs[2].is_empty());
        }
    }
}
