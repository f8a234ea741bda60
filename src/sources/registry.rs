//! Registry for the configured paper providers.

use std::sync::Arc;

#[cfg(feature = "source-arxiv")]
use super::arxiv::ArxivSource;
#[cfg(feature = "source-crossref")]
use super::crossref::CrossRefSource;
use super::{Source, SourceError};
use crate::config::Config;
use crate::storage::DedupStore;

/// Providers in priority order.
///
/// The first registered source wins ties during aggregation, so
/// registration order is significant.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the providers named in `config.search.sources`.
    ///
    /// Every provider shares the configured fetch policy and scope; `store`
    /// is attached to each so they all consult the same seen-identities set.
    pub fn from_config(
        config: &Config,
        store: Option<Arc<dyn DedupStore>>,
    ) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        let policy = config.search.policy.clone();
        let scope = config.scope().cloned();

        for name in config.source_names() {
            let source: Arc<dyn Source> = match name.as_str() {
                #[cfg(feature = "source-arxiv")]
                "arxiv" => {
                    let mut source = ArxivSource::new(policy.clone())?
                        .with_scope(scope.clone())
                        .keep_version(config.storage.keep_arxiv_version);
                    if let Some(store) = &store {
                        source = source.with_store(Arc::clone(store));
                    }
                    Arc::new(source)
                }
                #[cfg(feature = "source-crossref")]
                "crossref" => {
                    let mut source = CrossRefSource::new(policy.clone())?
                        .with_scope(scope.clone())
                        .with_mailto(config.search.crossref_mailto.clone());
                    if let Some(store) = &store {
                        source = source.with_store(Arc::clone(store));
                    }
                    Arc::new(source)
                }
                other => {
                    return Err(SourceError::InvalidRequest(format!(
                        "Unknown source '{}' (supported: {})",
                        other,
                        Self::supported_source_names().join(", ")
                    )))
                }
            };
            registry.register(source);
        }

        tracing::debug!("Registered sources: {:?}", registry.ids().collect::<Vec<_>>());
        Ok(registry)
    }

    /// Provider names compiled into this build
    pub fn supported_source_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        #[cfg(feature = "source-arxiv")]
        names.push("arxiv");
        #[cfg(feature = "source-crossref")]
        names.push("crossref");
        names
    }

    /// Register a new source; a repeated id keeps the earlier registration
    pub fn register(&mut self, source: Arc<dyn Source>) {
        if self.has(source.id()) {
            tracing::warn!("Source '{}' already registered; ignoring duplicate", source.id());
            return;
        }
        self.sources.push(source);
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// Sources in priority order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id())
    }

    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn into_sources(self) -> Vec<Arc<dyn Source>> {
        self.sources
    }
}
