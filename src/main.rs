//! Dataset-Harvester main entry point
//!
//! This is the command-line interface for the dataset crawler.

use anyhow::Context;
use clap::Parser;
use dataset_harvester::config::{load_config_with_hash, Config};
use dataset_harvester::crawler::{CrawlTask, Fetcher, Scheduler};
use dataset_harvester::gateway::{ChatGateway, IntentResolver, ResolvedIntent};
use dataset_harvester::output::print_summary;
use dataset_harvester::storage::SqliteIndex;
use dataset_harvester::HarvestError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Dataset-Harvester: a breadth-first dataset crawler
///
/// Give it a free-text instruction ("download all graph datasets from
/// https://snap.stanford.edu/data, depth 1") or an explicit --url. Pages are
/// crawled breadth-first, a classifier picks the dataset downloads and the
/// pages worth following, and downloaded datasets are registered in a local
/// index.
#[derive(Parser, Debug)]
#[command(name = "dataset-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A breadth-first dataset crawler", long_about = None)]
struct Cli {
    /// Free-text crawl instruction, resolved through the gateway
    #[arg(value_name = "PROMPT", required_unless_present = "url")]
    prompt: Option<String>,

    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root URL to crawl, bypassing instruction resolution
    #[arg(long, conflicts_with = "prompt")]
    url: Option<String>,

    /// Directory datasets are saved under
    #[arg(long)]
    save_path: Option<String>,

    /// What kind of data to download
    #[arg(long)]
    criteria: Option<String>,

    /// Maximum BFS depth (root is depth 0)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore the crawl history for this run
    #[arg(long)]
    fresh: bool,

    /// Resolve the task and print it without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("loading {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    let gateway = Arc::new(
        ChatGateway::from_env(&config.gateway).context("setting up the classifier gateway")?,
    );

    let task = resolve_task(&cli, &config, &*gateway).await?;

    if cli.dry_run {
        print_task(&task);
        return Ok(());
    }

    handle_crawl(&cli, &config, task, gateway).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("dataset_harvester=info,warn"),
            1 => EnvFilter::new("dataset_harvester=debug,info"),
            2 => EnvFilter::new("dataset_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the crawl task from the instruction and/or explicit flags
///
/// Explicit flags win over whatever the instruction resolved to.
async fn resolve_task(
    cli: &Cli,
    config: &Config,
    resolver: &dyn IntentResolver,
) -> Result<CrawlTask, HarvestError> {
    let mut intent = match (&cli.url, &cli.prompt) {
        (Some(url), _) => ResolvedIntent {
            url: Some(url.clone()),
            ..ResolvedIntent::default()
        },
        (None, Some(prompt)) => {
            tracing::info!("Resolving instruction: {}", prompt);
            resolver
                .resolve_intent(prompt)
                .await
                .map_err(|e| HarvestError::Intent(e.to_string()))?
        }
        (None, None) => ResolvedIntent::default(),
    };

    if cli.save_path.is_some() {
        intent.save_path = cli.save_path.clone();
    }
    if cli.criteria.is_some() {
        intent.criteria = cli.criteria.clone();
    }
    if cli.max_depth.is_some() {
        intent.max_depth = cli.max_depth;
    }

    CrawlTask::from_intent(intent, &config.output.datasets_root)
}

fn print_task(task: &CrawlTask) {
    println!("=== Dataset-Harvester Dry Run ===\n");
    println!("  Root URL: {}", task.root_url());
    println!("  Save path: {}", task.save_path().display());
    println!("  Criteria: {}", task.criteria());
    println!("  Max depth: {}", task.max_depth());
}

/// Runs the crawl, wiring Ctrl-C to cooperative cancellation
async fn handle_crawl(
    cli: &Cli,
    config: &Config,
    task: CrawlTask,
    gateway: Arc<ChatGateway>,
) -> anyhow::Result<()> {
    let index = Arc::new(
        SqliteIndex::new(&config.output.index_path)
            .with_context(|| format!("opening index {}", config.output.index_path.display()))?,
    );
    let fetcher = Arc::new(
        Fetcher::new(&config.crawler, &config.user_agent).context("building HTTP client")?,
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            signal_token.cancel();
        }
    });

    let mut scheduler = Scheduler::new(task, config, fetcher, gateway, index).fresh(cli.fresh);

    match scheduler.run(cancel).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(HarvestError::Interrupted) => {
            eprintln!("Crawl interrupted; visited URLs were saved to the history file.");
            std::process::exit(130);
        }
        Err(e) => Err(e.into()),
    }
}
