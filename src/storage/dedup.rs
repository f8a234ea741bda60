//! Persistent "already seen" tracking.
//!
//! A paper counts as seen when either identity key matches a recorded row:
//! the `(source, source_id)` pair, or the normalized DOI regardless of source.
//! The stored `doi_norm` is computed by [`normalize_doi`] on write, so lookups
//! and in-batch deduplication share one normalization.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::sync::Mutex;

use super::{Database, StorageError};
use crate::models::Paper;
use crate::utils::normalize_doi;

/// Filters out papers that were already delivered and records new ones.
pub trait DedupStore: Send + Sync + std::fmt::Debug {
    /// Keep only papers matching no recorded identity, preserving input order
    fn filter_new(&self, papers: Vec<Paper>) -> Result<Vec<Paper>, StorageError>;

    /// Record papers as seen. Re-marking updates title and DOI in place.
    fn mark_seen(&self, papers: &[Paper]) -> Result<(), StorageError>;
}

/// SQLite-backed store on the `seen_papers` table
#[derive(Debug, Clone)]
pub struct SqliteDedupStore {
    db: Database,
}

impl SqliteDedupStore {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Number of recorded identities
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM seen_papers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn is_seen(conn: &Connection, paper: &Paper) -> Result<bool, StorageError> {
        let (source, source_id) = paper.identity();
        let doi_norm = paper.doi.as_deref().and_then(normalize_doi);

        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM seen_papers
             WHERE (source = ?1 AND source_id = ?2)
                OR (?3 IS NOT NULL AND doi_norm = ?3)
             LIMIT 1",
        )?;
        let hit: Option<i64> = stmt
            .query_row(params![source, source_id, doi_norm], |row| row.get(0))
            .optional()?;
        Ok(hit.is_some())
    }
}

impl DedupStore for SqliteDedupStore {
    fn filter_new(&self, papers: Vec<Paper>) -> Result<Vec<Paper>, StorageError> {
        let conn = self.db.lock()?;
        let before = papers.len();
        let mut fresh = Vec::with_capacity(before);
        for paper in papers {
            if !Self::is_seen(&conn, &paper)? {
                fresh.push(paper);
            }
        }
        tracing::debug!("Dedup store: {} of {} papers are new", fresh.len(), before);
        Ok(fresh)
    }

    fn mark_seen(&self, papers: &[Paper]) -> Result<(), StorageError> {
        if papers.is_empty() {
            return Ok(());
        }

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO seen_papers (source, source_id, doi, doi_norm, title)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source, source_id) DO UPDATE SET
                     title = excluded.title,
                     doi = excluded.doi,
                     doi_norm = excluded.doi_norm",
            )?;
            for paper in papers {
                let (source, source_id) = paper.identity();
                let doi_norm = paper.doi.as_deref().and_then(normalize_doi);
                stmt.execute(params![source, source_id, paper.doi, doi_norm, paper.title])?;
            }
        }
        tx.commit()?;
        tracing::debug!("Dedup store: marked {} papers as seen", papers.len());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionSeen {
    ids: HashSet<(String, String)>,
    dois: HashSet<String>,
}

impl SessionSeen {
    fn contains(&self, paper: &Paper) -> bool {
        let (source, source_id) = paper.identity();
        if self.ids.contains(&(source.to_string(), source_id.to_string())) {
            return true;
        }
        paper
            .doi
            .as_deref()
            .and_then(normalize_doi)
            .is_some_and(|doi| self.dois.contains(&doi))
    }

    fn insert(&mut self, paper: &Paper) {
        let (source, source_id) = paper.identity();
        self.ids.insert((source.to_string(), source_id.to_string()));
        if let Some(doi) = paper.doi.as_deref().and_then(normalize_doi) {
            self.dois.insert(doi);
        }
    }
}

/// Dry-run store: reads persisted identities but records new ones only in
/// memory for the lifetime of this value.
#[derive(Debug)]
pub struct ReadOnlyDedupStore {
    inner: SqliteDedupStore,
    session: Mutex<SessionSeen>,
}

impl ReadOnlyDedupStore {
    pub fn new(db: &Database) -> Self {
        Self {
            inner: SqliteDedupStore::new(db),
            session: Mutex::new(SessionSeen::default()),
        }
    }
}

impl DedupStore for ReadOnlyDedupStore {
    fn filter_new(&self, papers: Vec<Paper>) -> Result<Vec<Paper>, StorageError> {
        let persisted_new = self.inner.filter_new(papers)?;
        let session = self.session.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(persisted_new
            .into_iter()
            .filter(|p| !session.contains(p))
            .collect())
    }

    fn mark_seen(&self, papers: &[Paper]) -> Result<(), StorageError> {
        let mut session = self.session.lock().map_err(|_| StorageError::Poisoned)?;
        for paper in papers {
            session.insert(paper);
        }
        Ok(())
    }
}

/// Row id of a seen paper, used to link content rows
pub(crate) fn seen_row_id(conn: &Connection, paper: &Paper) -> Result<Option<i64>, StorageError> {
    let (source, source_id) = paper.identity();
    let mut stmt =
        conn.prepare_cached("SELECT id FROM seen_papers WHERE source = ?1 AND source_id = ?2")?;
    Ok(stmt
        .query_row(params![source, source_id], |row| row.get(0))
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperBuilder, SourceType};

    fn arxiv(id: &str, doi: Option<&str>) -> Paper {
        let builder = PaperBuilder::new(id, format!("Paper {id}"), SourceType::Arxiv);
        match doi {
            Some(doi) => builder.doi(doi).build(),
            None => builder.build(),
        }
    }

    fn crossref(id: &str, doi: &str) -> Paper {
        PaperBuilder::new(id, format!("Paper {id}"), SourceType::CrossRef)
            .doi(doi)
            .build()
    }

    #[test]
    fn test_filter_new_excludes_source_id_match() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteDedupStore::new(&db);

        store.mark_seen(&[arxiv("2401.00001", None)]).unwrap();

        let fresh = store
            .filter_new(vec![arxiv("2401.00001", None), arxiv("2401.00002", None)])
            .unwrap();
        let ids: Vec<&str> = fresh.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["2401.00002"]);
    }

    #[test]
    fn test_filter_new_matches_doi_across_sources() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteDedupStore::new(&db);

        store
            .mark_seen(&[arxiv("2401.00001", Some("https://doi.org/10.1000/XYZ"))])
            .unwrap();

        let fresh = store
            .filter_new(vec![crossref("10.1000/xyz", "doi:10.1000/xyz")])
            .unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_only_leading_doi_prefix_is_stripped() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteDedupStore::new(&db);

        store
            .mark_seen(&[arxiv("2401.00001", Some("https://doi.org/doi:10.1/x"))])
            .unwrap();

        let fresh = store
            .filter_new(vec![crossref("other", "https://doi.org/doi:10.1/x")])
            .unwrap();
        assert!(fresh.is_empty());

        // "doi:10.1/x" and "10.1/x" are different keys after one strip.
        let fresh = store.filter_new(vec![crossref("bare", "10.1/x")]).unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_stored_doi_norm_matches_normalize_doi() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteDedupStore::new(&db);
        let dois = [
            "https://doi.org/doi:10.1/x",
            "  HTTP://DX.DOI.ORG/10.2/Y ",
            "doi:\u{a0}10.3/Ä\u{a0}",
            "10.4/z",
            "doi:",
        ];
        let papers: Vec<Paper> = dois
            .iter()
            .enumerate()
            .map(|(i, doi)| arxiv(&format!("p{i}"), Some(*doi)))
            .collect();
        store.mark_seen(&papers).unwrap();

        let conn = db.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT doi_norm FROM seen_papers ORDER BY id")
            .unwrap();
        let stored: Vec<Option<String>> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let expected: Vec<Option<String>> = dois.iter().map(|d| normalize_doi(d)).collect();
        assert_eq!(stored, expected);
        assert_eq!(stored[4], None);
    }

    #[test]
    fn test_same_id_different_source_is_new() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteDedupStore::new(&db);

        store.mark_seen(&[arxiv("shared-id", None)]).unwrap();
        let other = PaperBuilder::new("shared-id", "Other", SourceType::CrossRef).build();
        assert_eq!(store.filter_new(vec![other]).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_seen_twice_updates_row() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteDedupStore::new(&db);

        store.mark_seen(&[arxiv("2401.00001", None)]).unwrap();
        store
            .mark_seen(&[arxiv("2401.00001", Some("10.5555/late"))])
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);

        // The DOI learned on the second mark now matches other sources.
        let fresh = store.filter_new(vec![crossref("x", "10.5555/LATE")]).unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_seen_state_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.db");

        {
            let db = Database::open(&path).unwrap();
            SqliteDedupStore::new(&db)
                .mark_seen(&[arxiv("2401.00001", None)])
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let store = SqliteDedupStore::new(&db);
        assert!(store
            .filter_new(vec![arxiv("2401.00001", None)])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_read_only_store_does_not_persist() {
        let db = Database::open_in_memory().unwrap();
        let persisted = SqliteDedupStore::new(&db);
        persisted.mark_seen(&[arxiv("old", None)]).unwrap();

        let dry = ReadOnlyDedupStore::new(&db);
        let fresh = dry
            .filter_new(vec![arxiv("old", None), arxiv("new", Some("10.1/new"))])
            .unwrap();
        assert_eq!(fresh.len(), 1);

        dry.mark_seen(&fresh).unwrap();
        assert_eq!(persisted.count().unwrap(), 1);

        // Session memory applies both identity keys.
        assert!(dry.filter_new(vec![arxiv("new", None)]).unwrap().is_empty());
        assert!(dry
            .filter_new(vec![crossref("other", "https://doi.org/10.1/NEW")])
            .unwrap()
            .is_empty());

        // A second dry run starts clean.
        let again = ReadOnlyDedupStore::new(&db);
        assert_eq!(again.filter_new(vec![arxiv("new", None)]).unwrap().len(), 1);
    }
}
