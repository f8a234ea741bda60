//! Optional archive of full paper metadata, linked to `seen_papers`.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::dedup::seen_row_id;
use super::{Database, StorageError};
use crate::models::Paper;

/// Row counts reported by [`ContentStore::statistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    pub seen_papers: usize,
    pub content_rows: usize,
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    db: Database,
}

impl ContentStore {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Save content rows for papers already marked seen.
    ///
    /// Papers without a `seen_papers` row are skipped. Returns the number of rows written.
    pub fn save_papers(&self, papers: &[Paper]) -> Result<usize, StorageError> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let mut saved = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO paper_content (
                     seen_paper_id, title, authors, abstract, published_at, updated_at,
                     primary_category, categories, abstract_url, pdf_url, doi, extra
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            for paper in papers {
                let Some(seen_id) = seen_row_id(&tx, paper)? else {
                    tracing::debug!(
                        "Skipping content for unseen paper {}:{}",
                        paper.source.id(),
                        paper.paper_id
                    );
                    continue;
                };

                let extra = if paper.extra.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&paper.extra)?)
                };

                stmt.execute(params![
                    seen_id,
                    paper.title,
                    serde_json::to_string(&paper.authors)?,
                    paper.r#abstract,
                    paper.published.map(rfc3339),
                    paper.updated.map(rfc3339),
                    paper.primary_category,
                    serde_json::to_string(&paper.categories)?,
                    paper.links.abstract_url,
                    paper.links.pdf_url,
                    paper.doi,
                    extra,
                ])?;
                saved += 1;
            }
        }
        tx.commit()?;
        tracing::info!("Saved content for {} of {} papers", saved, papers.len());
        Ok(saved)
    }

    pub fn statistics(&self) -> Result<ContentStats, StorageError> {
        let conn = self.db.lock()?;
        let seen: i64 = conn.query_row("SELECT COUNT(*) FROM seen_papers", [], |r| r.get(0))?;
        let content: i64 = conn.query_row("SELECT COUNT(*) FROM paper_content", [], |r| r.get(0))?;
        Ok(ContentStats {
            seen_papers: seen as usize,
            content_rows: content as usize,
        })
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}
