//! Stay-Harvest main entry point
//!
//! This is the command-line interface for the Stay-Harvest listing scraper.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stay_harvest::config::{load_config_with_hash, Config};
use stay_harvest::output::{load_statistics, print_statistics};
use stay_harvest::query::room_id_from_url;
use stay_harvest::storage::{open_storage, RunStatus};
use stay_harvest::{BatchReport, CityTarget, Dataset, Harvester};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Stay-Harvest: listing, availability and review scraper
///
/// Fetches listing details, availability calendars and reviews for rooms,
/// and listing summaries for city searches. Completed targets are recorded
/// in an index so an interrupted run can be resumed.
#[derive(Parser, Debug)]
#[command(name = "stay-harvest")]
#[command(version)]
#[command(about = "Resilient listing, calendar and review scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Room ids to harvest, comma separated
    #[arg(long, value_delimiter = ',')]
    rooms: Vec<u64>,

    /// File with one room id or room URL per line
    #[arg(long, value_name = "PATH")]
    rooms_file: Option<PathBuf>,

    /// City to search (repeatable)
    #[arg(long = "city", value_name = "NAME")]
    cities: Vec<String>,

    /// Also harvest every room found by the city searches
    #[arg(long)]
    follow: bool,

    /// Room datasets to fetch
    #[arg(long, value_delimiter = ',', default_values_t = Dataset::ALL.to_vec())]
    datasets: Vec<Dataset>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Fetch every target again, ignoring completed entries in the index
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the index and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }

    let rooms = collect_rooms(&cli)?;
    if rooms.is_empty() && cli.cities.is_empty() {
        bail!("nothing to do: pass --rooms, --rooms-file or --city");
    }

    if cli.dry_run {
        handle_dry_run(&config, &rooms, &cli);
        return Ok(());
    }

    handle_harvest(config, &config_hash, rooms, &cli).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stay_harvest=info,warn"),
            1 => EnvFilter::new("stay_harvest=debug,info"),
            _ => EnvFilter::new("stay_harvest=trace,debug"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Room ids from `--rooms` and `--rooms-file`, in order, duplicates kept
fn collect_rooms(cli: &Cli) -> anyhow::Result<Vec<u64>> {
    let mut rooms = cli.rooms.clone();

    if let Some(path) = &cli.rooms_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rooms file {}", path.display()))?;
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let id = line
                .parse::<u64>()
                .ok()
                .or_else(|| room_id_from_url(line))
                .with_context(|| format!("{}:{}: not a room id or room URL: '{}'", path.display(), number + 1, line))?;
            rooms.push(id);
        }
    }

    Ok(rooms)
}

/// Handles the --stats mode: shows statistics from the index
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Index: {}\n", config.output.index_path);

    let storage = open_storage(Path::new(&config.output.index_path))
        .context("failed to open index")?;
    let stats = load_statistics(&storage).context("failed to read index")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --dry-run mode: shows the targets and the limits that apply
fn handle_dry_run(config: &Config, rooms: &[u64], cli: &Cli) {
    println!("=== Stay-Harvest Dry Run ===\n");

    println!("Client:");
    println!("  Base URL: {}", config.client.base_url);
    println!("  Locale / currency: {} / {}", config.client.locale, config.client.currency);
    println!(
        "  Fallback API key: {}",
        if config.client.fallback_api_key.is_some() { "configured" } else { "none" }
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Backoff base / jitter: {}ms / {}ms", config.retry.backoff_base_ms, config.retry.jitter_ms);

    println!("\nScheduler:");
    println!(
        "  Concurrency (rooms / cities): {} / {}",
        config.scheduler.room_concurrency, config.scheduler.city_concurrency
    );
    println!("  Delay: {}-{}ms", config.scheduler.min_delay_ms, config.scheduler.max_delay_ms);

    let datasets: Vec<String> = cli.datasets.iter().map(ToString::to_string).collect();
    println!("\nRooms ({}), datasets: {}", rooms.len(), datasets.join(", "));
    for room in rooms {
        println!("  - {}", room);
    }

    println!("\nCities ({}){}", cli.cities.len(), if cli.follow { ", following results" } else { "" });
    for city in &cli.cities {
        println!("  - {}", city);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: &str, mut rooms: Vec<u64>, cli: &Cli) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let storage = open_storage(Path::new(&config.output.index_path)).context("failed to open index")?;
    let harvester = Harvester::new(config, cancel.clone())
        .and_then(|h| h.with_index(storage, config_hash))
        .context("failed to set up harvester")?
        .fresh(cli.fresh);
    let harvester = Arc::new(harvester);

    if cli.fresh {
        tracing::info!("Starting fresh harvest (ignoring completed targets)");
    }

    let mut report = BatchReport::new(Vec::new(), Default::default());

    if !cli.cities.is_empty() {
        let targets = cli.cities.iter().map(CityTarget::named).collect();
        let batch = harvester.run_cities(targets).await;
        tracing::info!("City searches: {}", batch.report);
        if cli.follow {
            tracing::info!(rooms = batch.room_ids.len(), "following rooms found by searches");
            rooms.extend(batch.room_ids);
        }
        report.merge(batch.report);
    }

    if !rooms.is_empty() && !cancel.is_cancelled() {
        let batch = harvester.run_rooms(&rooms, &cli.datasets).await;
        tracing::info!("Rooms: {}", batch);
        report.merge(batch);
    }

    let status = if cancel.is_cancelled() || report.was_cancelled() {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    };
    harvester
        .finish(status)
        .await
        .context("failed to close run in index")?;

    print_report(&report);

    if status == RunStatus::Interrupted {
        bail!("harvest interrupted; re-run the same command to resume");
    }
    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after in-flight requests");
            cancel.cancel();
        }
    });
}

fn print_report(report: &BatchReport) {
    println!("\n=== Harvest Summary ===\n");
    println!("{}", report);
    println!("Success Rate: {:.1}%", report.success_rate() * 100.0);

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("\nFailures ({}):", failures.len());
        for job in failures {
            println!(
                "  - {} (attempts: {}, last status: {}): {}",
                job.key,
                job.attempts.map_or("-".to_string(), |a| a.to_string()),
                job.last_status.map_or("-".to_string(), |s| s.to_string()),
                job.error.as_deref().unwrap_or("")
            );
        }
    }
}
