use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paper_tracker::config::{find_config_file, load_config, Config, LogFormat, LoggingConfig};
use paper_tracker::services::AggregationService;
use paper_tracker::sources::SourceRegistry;
use paper_tracker::storage::{
    ContentStore, Database, DedupStore, ReadOnlyDedupStore, SqliteDedupStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Paper Tracker - Pull newly published papers from arXiv and Crossref without repeats
#[derive(Parser, Debug)]
#[command(name = "paper-tracker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pull newly published papers from arXiv and Crossref without repeats", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error log output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every configured query and print new papers as JSON lines
    #[command(alias = "s")]
    Search {
        /// Read seen papers but do not record new ones
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of papers per query (defaults to search.max_results)
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// List the providers available in this build
    Sources,

    /// Show counts from the local database
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(find_config_file);
    let config = match &config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    init_tracing(cli.verbose, cli.quiet, &config.logging);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Commands::Search { dry_run, limit } => {
            if config_path.is_none() {
                anyhow::bail!(
                    "No configuration file found; pass --config or create paper-tracker.toml"
                );
            }
            run_search(&config, dry_run, limit).await
        }
        Commands::Sources => {
            for name in SourceRegistry::supported_source_names() {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Stats => {
            let db = Database::open(config.storage.resolved_db_path())?;
            let stats = ContentStore::new(&db).statistics()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("paper_tracker={}", level)),
    );
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries results, so logs go to stderr
    match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run_search(config: &Config, dry_run: bool, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.search.policy.max_results);
    let read_only = dry_run || config.storage.read_only;

    let db = if config.storage.enabled {
        Some(Database::open(config.storage.resolved_db_path())?)
    } else {
        tracing::info!("Storage disabled; results are not deduplicated across runs");
        None
    };

    let store: Option<Arc<dyn DedupStore>> = db.as_ref().map(|db| {
        if read_only {
            Arc::new(ReadOnlyDedupStore::new(db)) as Arc<dyn DedupStore>
        } else {
            Arc::new(SqliteDedupStore::new(db)) as Arc<dyn DedupStore>
        }
    });

    let result = match SourceRegistry::from_config(config, store.clone()) {
        Ok(registry) => {
            let mut service = AggregationService::new(registry.into_sources());
            if let Some(store) = &store {
                service = service.with_store(Arc::clone(store));
            }
            let result = run_queries(config, &service, db.as_ref(), limit, read_only).await;
            service.close().await;
            result
        }
        Err(e) => Err(e.into()),
    };

    drop(store);
    if let Some(db) = db {
        if let Err(e) = db.close() {
            tracing::warn!("Failed to close database: {}", e);
        }
    }
    result
}

async fn run_queries(
    config: &Config,
    service: &AggregationService,
    db: Option<&Database>,
    limit: usize,
    read_only: bool,
) -> Result<()> {
    let content = db
        .filter(|_| config.storage.content_storage_enabled && !read_only)
        .map(ContentStore::new);
    let mut failed = 0usize;

    for query in &config.queries {
        let label = query.label();
        let papers = match service.search(query, limit).await {
            Ok(papers) => papers,
            Err(e) => {
                tracing::error!("Query [{}] failed: {}", label, e);
                failed += 1;
                continue;
            }
        };

        tracing::info!("Query [{}]: {} new papers", label, papers.len());
        for paper in &papers {
            let line = serde_json::json!({ "query": label, "paper": paper });
            println!("{}", line);
        }

        if let Some(content) = &content {
            let saved = content.save_papers(&papers)?;
            tracing::debug!("Stored content for {} papers", saved);
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} queries failed", failed, config.queries.len());
    }
    Ok(())
}
