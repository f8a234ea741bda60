//! Mock source for testing purposes.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{BooleanQuery, Paper, PaperBuilder, SourceType};
use crate::sources::{Source, SourceError};

/// A mock source for testing that returns predefined papers or a configured failure.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    papers: Mutex<Vec<Paper>>,
    failure: Option<String>,
    fail_close: bool,
    closed: AtomicBool,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source reporting `id` as its source id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            papers: Mutex::new(Vec::new()),
            failure: None,
            fail_close: false,
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_papers(self, papers: Vec<Paper>) -> Self {
        self.set_papers(papers);
        self
    }

    /// Make every search fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Make `close` fail (after recording the call).
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Replace the papers returned by later searches.
    pub fn set_papers(&self, papers: Vec<Paper>) {
        let mut guard = self.papers.lock().unwrap_or_else(|e| e.into_inner());
        *guard = papers;
    }

    pub fn search_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn search(&self, _query: &BooleanQuery, limit: usize) -> Result<Vec<Paper>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(SourceError::Other(message.clone()));
        }
        let guard = self.papers.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.iter().take(limit).cloned().collect())
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(SourceError::Other(format!("{} failed to close", self.id)));
        }
        Ok(())
    }
}

/// Helper function to create a mock paper updated just now.
pub fn make_paper(paper_id: &str, title: &str, source_type: SourceType) -> Paper {
    PaperBuilder::new(paper_id, title, source_type)
        .updated(Utc::now())
        .abstract_url(format!("http://example.com/{}", paper_id))
        .build()
}
