//! Site search CLI
//!
//! Local execution entry point: indexing, search and statistics over a
//! snapshot kept in the storage directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sitesearch::{
    error::{AppError, Result},
    models::{Config, SearchQuery},
    pipeline::IndexingService,
    services::{Lemmatizer, SearchEngine, StatisticsService},
    storage::{LocalSnapshot, MemoryStorage},
    utils::http::HttpFetcher,
};
use tokio::task::JoinHandle;

/// Site search - crawler and lemma index for Russian websites
#[derive(Parser, Debug)]
#[command(
    name = "sitesearch",
    version,
    about = "Crawl configured sites and search them"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the index snapshot
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wipe the index and crawl every configured site
    Index,

    /// Re-crawl one configured site, by URL or name
    IndexSite {
        url: String,
    },

    /// Search indexed pages
    Search {
        query: String,

        /// Restrict results to one site root URL
        #[arg(long)]
        site: Option<String>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Page size (default: search.default_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show per-site indexing statistics
    Stats,

    /// Validate configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Wait for an indexing run, stopping it on Ctrl-C.
async fn wait_for_run(service: &IndexingService, mut handle: JoinHandle<()>) -> Result<()> {
    tokio::select! {
        joined = &mut handle => {
            if let Err(e) = joined {
                log::error!("Indexing task failed: {e}");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::warn!("Interrupted, stopping indexing...");
            if let Err(e) = service.stop().await {
                log::warn!("Could not stop indexing: {e}");
            }
            if let Err(e) = handle.await {
                log::error!("Indexing task failed: {e}");
            }
        }
    }
    Ok(())
}

/// Run a full or single-site indexing pass and persist the result.
async fn index(
    config: &Arc<Config>,
    snapshot: &LocalSnapshot,
    lemmatizer: Lemmatizer,
    site: Option<String>,
) -> Result<()> {
    config.validate()?;

    let storage: Arc<MemoryStorage> = Arc::new(snapshot.load().await?);
    let fetcher = Arc::new(HttpFetcher::new(&config.crawler)?);
    let service = IndexingService::new(Arc::clone(config), storage.clone(), fetcher, lemmatizer);

    let handle = match site {
        Some(url) => service.start_one(&url).await?,
        None => service.start_all().await?,
    };
    wait_for_run(&service, handle).await?;

    snapshot.save(&storage).await?;
    let stats = StatisticsService::new(storage, config.sites.clone())
        .statistics(service.is_indexing())
        .await?;
    for site in &stats.detailed {
        log::info!(
            "{} [{}] pages={} lemmas={} {}",
            site.url,
            site.status,
            site.pages,
            site.lemmas,
            site.error
        );
    }
    Ok(())
}

/// Log a failed command: caller mistakes as warnings, faults as errors.
fn report(error: &AppError) {
    if error.is_user_error() {
        log::warn!("{error}");
    } else {
        log::error!("{error}");
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let config = Arc::new(config);
    let snapshot = LocalSnapshot::new(&cli.storage_dir);
    let lemmatizer = Lemmatizer::russian();

    match cli.command {
        Command::Index => index(&config, &snapshot, lemmatizer, None).await?,

        Command::IndexSite { url } => index(&config, &snapshot, lemmatizer, Some(url)).await?,

        Command::Search {
            query,
            site,
            offset,
            limit,
        } => {
            let storage = Arc::new(snapshot.load().await?);
            let engine = SearchEngine::new(storage, lemmatizer, config.search.clone());

            let mut request = SearchQuery::new(query, limit.unwrap_or(config.search.default_limit))
                .with_offset(offset);
            if let Some(site) = site {
                request = request.with_site(site);
            }

            let response = engine.search(&request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Stats => {
            let storage = Arc::new(snapshot.load().await?);
            let stats = StatisticsService::new(storage, config.sites.clone())
                .statistics(false)
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            config.validate()?;
            log::info!("Config OK ({} sites)", config.sites.len());
        }
    }

    Ok(())
}
