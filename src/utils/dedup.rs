//! Deduplication utilities for papers across sources.

use std::cmp::Reverse;
use std::collections::HashMap;

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Paper;

/// Minimum normalized title length for the title+year key to apply.
///
/// Shorter titles ("Introduction", "Editorial") collide too often.
pub const MIN_TITLE_KEY_LEN: usize = 12;

const DOI_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9 ]").expect("title regex is valid"));

/// Normalize a DOI for identity comparison.
///
/// Lower-cases, trims and strips resolver prefixes. Returns `None` when
/// nothing is left.
pub fn normalize_doi(doi: &str) -> Option<String> {
    let mut doi = doi.trim().to_lowercase();
    for prefix in DOI_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim().to_string();
            break;
        }
    }
    (!doi.is_empty()).then_some(doi)
}

/// Normalize a title for comparison
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity key used for in-batch deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Doi(String),
    TitleYear(String, i32),
    /// Never collides with another paper
    Unique(String, String),
}

impl DedupKey {
    pub fn for_paper(paper: &Paper) -> Self {
        if let Some(doi) = paper.doi.as_deref().and_then(normalize_doi) {
            return DedupKey::Doi(doi);
        }
        let title = normalize_title(&paper.title);
        if title.len() >= MIN_TITLE_KEY_LEN {
            if let Some(year) = paper.year() {
                return DedupKey::TitleYear(title, year);
            }
        }
        DedupKey::Unique(paper.source.id().to_string(), paper.paper_id.clone())
    }
}

/// Source priority, lower rank wins. Sources not listed rank last.
#[derive(Debug, Clone, Default)]
pub struct SourcePriority {
    ranks: HashMap<String, usize>,
}

impl SourcePriority {
    pub fn new<I, S>(source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ranks = HashMap::new();
        for (idx, id) in source_ids.into_iter().enumerate() {
            ranks.entry(id.into()).or_insert(idx);
        }
        Self { ranks }
    }

    pub fn rank(&self, source_id: &str) -> usize {
        self.ranks.get(source_id).copied().unwrap_or(usize::MAX)
    }
}

/// Sort most recent first, then by source priority, then by id
pub fn sort_by_recency(papers: &mut [Paper], priority: &SourcePriority) {
    papers.sort_by(|a, b| {
        (Reverse(a.timestamp()), priority.rank(a.source.id()), &a.paper_id).cmp(&(
            Reverse(b.timestamp()),
            priority.rank(b.source.id()),
            &b.paper_id,
        ))
    });
}

/// Whether `candidate` should replace `current` as a duplicate group's representative
fn outranks(candidate: &Paper, current: &Paper, priority: &SourcePriority) -> bool {
    let key = |p: &Paper| (priority.rank(p.source.id()), Reverse(p.timestamp()), p.paper_id.clone());
    key(candidate) < key(current)
}

/// Remove in-batch duplicates.
///
/// Each duplicate group keeps one paper: the one from the highest-priority
/// source, then the most recent, then the lowest id. The survivor takes the
/// position of the group's first occurrence.
pub fn deduplicate_papers(papers: Vec<Paper>, priority: &SourcePriority) -> Vec<Paper> {
    let mut slots: Vec<Paper> = Vec::with_capacity(papers.len());
    let mut index: HashMap<DedupKey, usize> = HashMap::new();

    for paper in papers {
        let key = DedupKey::for_paper(&paper);
        match index.get(&key) {
            Some(&slot) => {
                if outranks(&paper, &slots[slot], priority) {
                    tracing::debug!(
                        "Duplicate {}:{} replaces {}:{}",
                        paper.source.id(),
                        paper.paper_id,
                        slots[slot].source.id(),
                        slots[slot].paper_id
                    );
                    slots[slot] = paper;
                }
            }
            None => {
                index.insert(key, slots.len());
                slots.push(paper);
            }
        }
    }

    slots
}
