//! Sumi-Trawl main entry point
//!
//! This is the command-line interface for the Sumi-Trawl site crawler.

use anyhow::Context;
use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use sumi_trawl::config::{load_config, Config};
use sumi_trawl::output::{load_job_report, print_job_list, print_job_report, DEFAULT_PAGE_SIZE};
use sumi_trawl::storage::{open_storage, purge_expired, JobId, JobStore};
use sumi_trawl::{CrawlEngine, CrawlRequest, JobStatus};
use tracing_subscriber::EnvFilter;

/// Sumi-Trawl: a bounded, polite site crawler
///
/// Sumi-Trawl crawls a website from a seed URL, breadth-first, within a
/// depth limit and a page cap, respecting robots.txt and per-host rate
/// limits. Every crawl is recorded as a job with the URL and title of each
/// page it reached.
#[derive(Parser, Debug)]
#[command(name = "sumi-trawl")]
#[command(version)]
#[command(about = "A bounded, polite site crawler", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["seed", "list", "show", "cleanup"])
))]
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

    /// Crawl from this seed URL (repeat to run several jobs at once)
    #[arg(long, value_name = "URL")]
    seed: Vec<String>,

    /// Override the configured maximum link depth
    #[arg(long, value_name = "N", requires = "seed")]
    max_depth: Option<u32>,

    /// Override the configured page cap
    #[arg(long, value_name = "N", requires = "seed", value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// List recent jobs and exit
    #[arg(long)]
    list: bool,

    /// Number of jobs to list
    #[arg(long, value_name = "N", default_value_t = 20, requires = "list")]
    limit: u32,

    /// Show a job report and exit
    #[arg(long, value_name = "JOB_ID")]
    show: Option<i64>,

    /// Report page to show (starting at 1)
    #[arg(long, value_name = "P", default_value_t = 1, requires = "show",
          value_parser = clap::value_parser!(u32).range(1..))]
    page: u32,

    /// Crawled pages per report page (1-100)
    #[arg(long, value_name = "S", default_value_t = DEFAULT_PAGE_SIZE, requires = "show",
          value_parser = clap::value_parser!(u32).range(1..=100))]
    page_size: u32,

    /// Delete jobs older than the configured retention window and exit
    #[arg(long)]
    cleanup: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;

    let storage = open_storage(Path::new(&config.output.database_path)).with_context(|| {
        format!("failed to open job store {}", config.output.database_path)
    })?;
    let store: Arc<dyn JobStore> = Arc::new(storage);

    if cli.list {
        print_job_list(&store.list_jobs(cli.limit, 0)?);
        Ok(ExitCode::SUCCESS)
    } else if let Some(job_id) = cli.show {
        let report = load_job_report(store.as_ref(), JobId(job_id), cli.page, cli.page_size)?;
        print_job_report(&report);
        Ok(ExitCode::SUCCESS)
    } else if cli.cleanup {
        let deleted = purge_expired(store.as_ref(), config.retention.retention_days)?;
        println!("Deleted {} expired job(s)", deleted);
        Ok(ExitCode::SUCCESS)
    } else {
        handle_crawl(config, store, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_trawl=info,warn"),
            1 => EnvFilter::new("sumi_trawl=debug,info"),
            2 => EnvFilter::new("sumi_trawl=trace,debug"),
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

/// Runs one job per seed concurrently and reports each outcome
async fn handle_crawl(
    config: Config,
    store: Arc<dyn JobStore>,
    cli: &Cli,
) -> anyhow::Result<ExitCode> {
    let engine = CrawlEngine::with_http_fetcher(Arc::new(config), store)
        .context("failed to build HTTP client")?;

    let requests = cli
        .seed
        .iter()
        .map(|seed| CrawlRequest {
            seed_url: seed.clone(),
            max_depth: cli.max_depth,
            max_pages: cli.max_pages,
        })
        .collect();

    let handles = engine
        .submit_all(requests)
        .await
        .context("failed to start crawl jobs")?;
    for (handle, seed) in handles.iter().zip(&cli.seed) {
        println!("Job {} started for {}", handle.job_id(), seed);
    }

    let mut any_failed = false;
    for handle in handles {
        let summary = match handle.wait().await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("{}", e);
                any_failed = true;
                continue;
            }
        };
        println!(
            "Job {} {}: {} page(s) crawled, {} skipped",
            summary.job_id, summary.status, summary.pages_persisted, summary.pages_skipped
        );
        if let Some(error) = &summary.error {
            println!("  Error: {}", error);
        }
        any_failed |= summary.status == JobStatus::Failed;
    }

    Ok(if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
