//! Configuration management.
//!
//! # Configuration File Format
//!
//! ```toml
//! [search]
//! sources = ["arxiv", "crossref"]
//! max_results = 20
//! pull_every = 7
//! fill_enabled = false
//! max_lookback_days = 30
//! max_fetch_items = 500
//! fetch_batch_size = 100
//!
//! [scope]
//! CATEGORY = { OR = ["cs.CV"] }
//!
//! [[queries]]
//! NAME = "diffusion"
//! TEXT = { OR = ["diffusion model"], NOT = ["survey"] }
//!
//! [storage]
//! enabled = true
//! db_path = "~/.local/share/paper-tracker/papers.db"
//! read_only = false
//! content_storage_enabled = false
//! keep_arxiv_version = false
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! Every value can be overridden from the environment, e.g.
//! `PAPER_TRACKER_SEARCH__MAX_RESULTS=5`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::{BooleanQuery, FetchPolicy, PolicyError};
use crate::sources::SourceRegistry;
use crate::storage::Database;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    /// Global scope intersected with every query
    #[serde(default)]
    pub scope: Option<BooleanQuery>,

    #[serde(default)]
    pub queries: Vec<BooleanQuery>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider selection plus the fetch policy shared by every provider
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Provider names; order is source priority
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Contact address for Crossref's polite pool
    #[serde(default)]
    pub crossref_mailto: Option<String>,

    #[serde(flatten)]
    pub policy: FetchPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            crossref_mailto: None,
            policy: FetchPolicy::default(),
        }
    }
}

fn default_sources() -> Vec<String> {
    vec!["arxiv".to_string()]
}

/// Local persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist seen identities across runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file; defaults to the platform data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Dry-run mode: read persisted identities but never write them
    #[serde(default)]
    pub read_only: bool,

    /// Also store full paper records for returned results
    #[serde(default)]
    pub content_storage_enabled: bool,

    #[serde(default)]
    pub keep_arxiv_version: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
            read_only: false,
            content_storage_enabled: false,
            keep_arxiv_version: false,
        }
    }
}

impl StorageConfig {
    /// Configured path with a leading `~/` expanded, else the default location
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => expand_home(path),
            None => Database::default_path(),
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors, all raised before any network I/O
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("Unknown source '{name}' (supported: {supported})")]
    UnknownSource { name: String, supported: String },

    #[error("No sources configured")]
    NoSources,

    #[error("No queries configured")]
    NoQueries,

    #[error("Query '{0}' has no search terms")]
    EmptyQuery(String),
}

impl Config {
    /// Check policy consistency, provider names and query definitions
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.policy.validate()?;

        let sources = self.source_names();
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        let supported = SourceRegistry::supported_source_names();
        if let Some(unknown) = sources.iter().find(|s| !supported.contains(&s.as_str())) {
            return Err(ConfigError::UnknownSource {
                name: unknown.clone(),
                supported: supported.join(", "),
            });
        }

        if self.queries.is_empty() {
            return Err(ConfigError::NoQueries);
        }
        for (index, query) in self.queries.iter().enumerate() {
            if query.is_empty() {
                let label = query
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("#{}", index + 1));
                return Err(ConfigError::EmptyQuery(label));
            }
        }
        Ok(())
    }

    /// Normalized provider names in priority order; repeats keep the first occurrence
    pub fn source_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.search
            .sources
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// The global scope, ignoring an empty `[scope]` table
    pub fn scope(&self) -> Option<&BooleanQuery> {
        self.scope.as_ref().filter(|s| !s.is_empty())
    }
}

/// Load configuration from a file, apply environment overrides and validate
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix("PAPER_TRACKER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("search.sources"),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    tracing::debug!(
        "Loaded configuration from {} ({} queries)",
        path.display(),
        config.queries.len()
    );
    Ok(config)
}

/// Find a configuration file in the working directory or the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("paper-tracker.toml");
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("paper-tracker").join("config.toml"))
        .filter(|path| path.is_file())
}
