//! CLI entry point for the subway tracker.
//!
//! Provides subcommands for running the polling dashboard, running a single
//! poll cycle, building the delay training dataset from stored history, and
//! listing the configured feed endpoints.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subway_tracker::{
    dashboard::{self, AppState},
    feeds::FeedCatalog,
    fetch::{BasicClient, FeedSource, HttpFeedSource, auth::ApiKey},
    output::print_json,
    poller::{Poller, run_poll_loop},
    schedule::{Schedule, StopNames, load_stop_names},
    store::Store,
    training::{TimeRange, build_training_set, write_training_set},
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "subway_tracker")]
#[command(about = "Track NYC subway trains from the MTA GTFS-RT feeds", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IngestArgs {
    /// SQLite database holding the observation history
    #[arg(long, default_value = "data/subway.db")]
    db: PathBuf,

    /// Directory with the static GTFS files, used for stop names
    #[arg(long)]
    gtfs_dir: Option<PathBuf>,

    /// JSON file overriding the built-in feed catalog
    #[arg(long)]
    feeds: Option<PathBuf>,

    /// CSV file to append per-feed poll statistics to
    #[arg(long)]
    stats_output: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feeds on an interval and serve the dashboard
    Serve {
        #[command(flatten)]
        ingest: IngestArgs,

        /// Address to bind the dashboard to
        #[arg(long, default_value = "127.0.0.1")]
        bind: IpAddr,

        /// Port to serve the dashboard on
        #[arg(short, long, default_value_t = 8501)]
        port: u16,

        /// Poll interval in seconds
        #[arg(short, long, default_value_t = 60)]
        interval: u64,
    },
    /// Run a single poll cycle and exit
    Poll {
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Build the per-stop delay training dataset from stored history
    BuildTrainingData {
        /// SQLite database holding the observation history
        #[arg(long, default_value = "data/subway.db")]
        db: PathBuf,

        /// Directory with the static GTFS files
        #[arg(long)]
        gtfs_dir: PathBuf,

        /// CSV file for the per-stop aggregates (overwritten)
        #[arg(short, long, default_value = "training_data.csv")]
        output: PathBuf,

        /// Optional CSV file for the individual delay records (overwritten)
        #[arg(long)]
        records_output: Option<PathBuf>,

        /// Only use history observed at or after this RFC 3339 instant
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Only use history observed before this RFC 3339 instant
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// List the configured feed endpoints
    ListFeeds {
        /// JSON file overriding the built-in feed catalog
        #[arg(long)]
        feeds: Option<PathBuf>,

        /// Print the catalog as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/subway_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("subway_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            ingest,
            bind,
            port,
            interval,
        } => {
            let store = Store::open(&ingest.db).await?;
            let catalog = load_catalog(ingest.feeds.as_deref())?;
            let poller = build_poller(&ingest, catalog.clone(), store.clone())?;
            let poller = Arc::new(Mutex::new(poller));

            let poll_task = tokio::spawn(run_poll_loop(
                poller.clone(),
                Duration::from_secs(interval.max(1)),
            ));

            let state = AppState {
                store: store.clone(),
                catalog: Arc::new(catalog),
                poller,
            };
            let result = dashboard::serve(state, SocketAddr::new(bind, port)).await;
            poll_task.abort();
            store.close().await;
            result?;
        }
        Commands::Poll { ingest } => {
            let store = Store::open(&ingest.db).await?;
            let catalog = load_catalog(ingest.feeds.as_deref())?;
            let poller = build_poller(&ingest, catalog, store.clone())?;

            let report = poller.run_cycle().await;
            store.close().await;
            let report = report?;
            for feed in &report.feeds {
                info!(
                    feed_name = feed.feed_name.as_deref().unwrap_or_default(),
                    positions = feed.positions,
                    estimates = feed.estimates,
                    estimate_yield_pct = feed.estimate_yield_pct(),
                    error = feed.error_type.as_deref().unwrap_or("none"),
                    "Feed"
                );
            }
        }
        Commands::BuildTrainingData {
            db,
            gtfs_dir,
            output,
            records_output,
            from,
            to,
        } => {
            let schedule = Schedule::load_from_dir(&gtfs_dir)?;
            let store = Store::open(&db).await?;

            let set = build_training_set(&store, &schedule, TimeRange::new(from, to)).await;
            store.close().await;
            let set = set?;
            write_training_set(&set, &output, records_output.as_deref())?;
        }
        Commands::ListFeeds { feeds, json } => {
            let catalog = load_catalog(feeds.as_deref())?;
            if json {
                print_json(&catalog)?;
            } else {
                for endpoint in catalog.endpoints() {
                    let lines: Vec<&str> = endpoint.lines.iter().map(|l| l.as_str()).collect();
                    info!(
                        feed_name = %endpoint.name,
                        url = %endpoint.url,
                        lines = %lines.join(","),
                        "Feed"
                    );
                }
                info!(
                    endpoints = catalog.endpoints().len(),
                    lines = catalog.known_lines().len(),
                    "Feed catalog summary"
                );
            }
        }
    }

    Ok(())
}

fn load_catalog(path: Option<&Path>) -> Result<FeedCatalog> {
    match path {
        Some(path) => FeedCatalog::load(path),
        None => Ok(FeedCatalog::mta_subway()),
    }
}

/// Wires the HTTP source, with the MTA key header when `MTA_API_KEY` is set,
/// and the stop-name table into a poller.
fn build_poller(args: &IngestArgs, catalog: FeedCatalog, store: Store) -> Result<Poller> {
    let client = BasicClient::with_timeout(Duration::from_secs(args.timeout))
        .context("building HTTP client")?;

    let source: Box<dyn FeedSource> = match std::env::var("MTA_API_KEY") {
        Ok(key) if !key.is_empty() => Box::new(HttpFeedSource::new(ApiKey::mta(client, &key)?)),
        _ => Box::new(HttpFeedSource::new(client)),
    };

    let stops = match &args.gtfs_dir {
        Some(dir) => load_stop_names(dir)?,
        None => StopNames::default(),
    };
    if stops.is_empty() {
        warn!("No stop names loaded; stop ids will be shown instead");
    } else {
        info!(stops = stops.len(), "Stop names loaded");
    }

    let mut poller = Poller::new(catalog, source, stops, store);
    if let Some(path) = &args.stats_output {
        poller = poller.with_stats_output(path.clone());
    }
    Ok(poller)
}
