//! Listing Harvester main entry point
//!
//! This is the command-line interface for the Listing Harvester crawler.

use clap::Parser;
use listing_harvester::config::{load_config_with_hash, Config};
use listing_harvester::crawler::Coordinator;
use listing_harvester::output::{load_statistics, print_statistics, print_summary};
use listing_harvester::storage::{session_path_for, JsonStore, SessionState};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Listing Harvester: a rate-limited classified-listing crawler
///
/// Listing Harvester paginates through listing index pages, fetches every
/// listing's detail page at a fixed request rate, and stores the extracted
/// fields in a JSON document that can be resumed after an interruption.
#[derive(Parser, Debug)]
#[command(name = "listing-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A rate-limited classified-listing crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from stored results and checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding stored results
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the result document and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvester=info,warn"),
            1 => EnvFilter::new("listing_harvester=debug,info"),
            2 => EnvFilter::new("listing_harvester=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Listing Harvester Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Request interval: {}ms", crawler.request_interval_ms);
    println!("  Workers: {}", crawler.workers);
    println!("  Fetch attempts: {}", crawler.max_fetch_attempts);
    println!("  Session retries: {}", crawler.max_session_retries);
    println!(
        "  Backoff: {}ms doubling, capped at {}ms",
        crawler.backoff_base_ms, crawler.backoff_max_ms
    );
    println!("  Request timeout: {}s", crawler.request_timeout_secs);
    match crawler.max_index_pages {
        Some(max) => println!("  Index page limit: {}", max),
        None => println!("  Index page limit: none"),
    }

    println!("\nClient identifier: {}", config.user_agent.header_value());

    let results_path = config.results_path();
    println!("\nOutput:");
    println!("  Results: {}", results_path.display());
    println!("  Checkpoint: {}", session_path_for(&results_path).display());

    println!("\nParser:");
    println!("  Listings: {}", config.parser.listing_selector);
    println!("  Next page: {}", config.parser.next_page_selector);
    println!("  Fields ({}):", config.parser.fields.len());
    for (name, selector) in &config.parser.fields {
        println!("    - {}: {}", name, selector);
    }

    let seed_url = config.seed_url()?;
    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling at {}", seed_url);

    if let Some(session) = SessionState::load(&session_path_for(&results_path))? {
        println!(
            "✓ Would resume after index page {} ({} listings pending)",
            session.last_index_page,
            session.pending_details.len()
        );
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the result document
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let results_path = config.results_path();
    println!("Results: {}\n", results_path.display());

    let store = JsonStore::open(&results_path)?;
    let stats = load_statistics(&store);
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding stored results)");
    } else {
        tracing::info!("Starting crawl (will resume from stored results)");
    }

    let mut coordinator = Coordinator::new(config, fresh)?.with_config_hash(config_hash);

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    match coordinator.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
