//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest listing harvester.

use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{crawl, CrawlOptions};
use sumi_harvest::supervisor::{supervise, RESTART_EXIT_CODE};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a resilient listing harvester
///
/// Sumi-Harvest walks a paginated listing site, enriches every listing with
/// its detail page, and checkpoints progress so it can resume after a time
/// budget, an interrupt, or an overloaded host.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient listing harvester", long_about = None)]
struct Cli {
    /// Maximum runtime in seconds (overrides the configured budget)
    #[arg(value_name = "BUDGET_SECS")]
    budget_secs: Option<u64>,

    /// Path to TOML configuration file (built-in defaults if omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, discarding saved progress
    #[arg(long)]
    fresh: bool,

    /// Relaunch the crawler whenever the watchdog forces a restart
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    supervise: bool,

    /// Show run history from the ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if cli.supervise {
        return handle_supervise().await;
    }

    match &cli.config {
        Some(path) => tracing::info!("Loading configuration from: {}", path.display()),
        None => tracing::info!("No configuration file given, using built-in defaults"),
    }
    let (config, config_hash) = match load_config_with_hash(cli.config.as_deref()) {
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
        handle_dry_run(&config, cli.budget_secs);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        let options = CrawlOptions {
            fresh: cli.fresh,
            runtime_budget: cli.budget_secs.map(Duration::from_secs),
            config_hash,
        };
        handle_crawl(config, options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles --supervise: reruns this binary, minus the flag, until it stops
/// asking for a restart
async fn handle_supervise() -> Result<(), Box<dyn std::error::Error>> {
    let program = std::env::current_exe()?;
    let args: Vec<OsString> = std::env::args_os()
        .skip(1)
        .filter(|arg| arg != "--supervise")
        .collect();

    tracing::info!(
        "Supervising {} (restart exit code {})",
        program.display(),
        RESTART_EXIT_CODE
    );
    let code = supervise(&program, &args).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config, budget_secs: Option<u64>) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Base URL: {}", config.crawler.base_url);
    println!("  Pages: 1..={}", config.crawler.max_pages);
    println!("  Record limit: {}", config.crawler.limit);
    println!(
        "  Workers: {} page, {} detail",
        config.crawler.page_workers, config.crawler.detail_workers
    );
    println!(
        "  Runtime budget: {}s",
        budget_secs.unwrap_or(config.crawler.runtime_budget_secs)
    );
    println!(
        "  Checkpoint every {} records",
        config.crawler.checkpoint_interval
    );

    println!("\nFetch Policy:");
    println!("  Attempts: {}", config.fetch.max_attempts);
    println!(
        "  Retry delay: {}-{}ms",
        config.fetch.retry_delay_min_ms, config.fetch.retry_delay_max_ms
    );
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nWatchdog:");
    if config.watchdog.enabled {
        println!(
            "  Restart after {} samples at or above {}%",
            config.watchdog.sustain_samples, config.watchdog.threshold_percent
        );
    } else {
        println!("  Disabled");
    }

    println!("\nOutput:");
    println!("  Progress: {}", config.output.data_path);
    println!("  State: {}", config.output.state_path);
    println!("  Final export: {}", config.output.final_path);
    println!("  Run ledger: {}", config.output.database_path);

    println!("\nDetail Fields ({}):", config.extractor.fields.len());
    for field in &config.extractor.fields {
        println!("  - {} ({})", field.name, field.selector);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows run history from the ledger
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use sumi_harvest::output::{load_run_history, print_run_history};
    use sumi_harvest::storage::RunLedger;

    if config.output.database_path.is_empty() {
        println!("Run ledger is disabled (output.database-path is empty)");
        return Ok(());
    }

    println!("Database: {}\n", config.output.database_path);

    let ledger = RunLedger::open(Path::new(&config.output.database_path))?;
    let history = load_run_history(&ledger, 20)?;
    print_run_history(&history);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    options: CrawlOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    match crawl(config, options).await {
        Ok(report) => {
            tracing::info!(
                "Run ended ({:?}): page {}, {} records, {:?} elapsed",
                report.outcome,
                report.current_page,
                report.scraped_count,
                report.elapsed
            );
            let code = report.outcome.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
