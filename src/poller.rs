//! The ingestion cycle: fetch every endpoint, normalize, append to the store.

use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, warn};

use crate::feeds::{FeedCatalog, FeedEndpoint};
use crate::fetch::FeedSource;
use crate::normalize::normalize_feed;
use crate::output::append_record;
use crate::parser::parse_feed;
use crate::schedule::StopNames;
use crate::stats::FeedStats;
use crate::store::Store;

/// What one cycle did, one [`FeedStats`] per endpoint in catalog order.
#[derive(Debug)]
pub struct CycleReport {
    pub observed_at: DateTime<Utc>,
    pub feeds: Vec<FeedStats>,
}

impl CycleReport {
    pub fn positions(&self) -> usize {
        self.feeds.iter().map(|f| f.positions).sum()
    }

    pub fn estimates(&self) -> usize {
        self.feeds.iter().map(|f| f.estimates).sum()
    }

    pub fn failed_feeds(&self) -> usize {
        self.feeds.iter().filter(|f| f.is_error()).count()
    }
}

pub struct Poller {
    catalog: FeedCatalog,
    source: Box<dyn FeedSource>,
    stops: StopNames,
    store: Store,
    stats_output: Option<PathBuf>,
}

impl Poller {
    pub fn new(catalog: FeedCatalog, source: Box<dyn FeedSource>, stops: StopNames, store: Store) -> Self {
        Self {
            catalog,
            source,
            stops,
            store,
            stats_output: None,
        }
    }

    /// Also append every cycle's [`FeedStats`] to a CSV file.
    pub fn with_stats_output(mut self, path: PathBuf) -> Self {
        self.stats_output = Some(path);
        self
    }

    /// Runs one cycle over every endpoint, in catalog order.
    ///
    /// Fetch and decode failures are logged and recorded in the report; the
    /// remaining endpoints are still ingested. A storage failure aborts the
    /// cycle and is returned.
    #[tracing::instrument(skip(self), err)]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        // Microseconds keep back-to-back cycles apart in the latest-poll views.
        let observed_at = Utc::now().trunc_subsecs(6);
        let mut feeds = Vec::with_capacity(self.catalog.endpoints().len());

        for endpoint in self.catalog.endpoints() {
            let feed_span = tracing::info_span!("poll_feed", feed_name = %endpoint.name);
            let stats = self
                .ingest(endpoint, observed_at)
                .instrument(feed_span)
                .await?
                .with_feed_info(&endpoint.name, &endpoint.url);

            if let Some(path) = &self.stats_output {
                if let Err(e) = append_record(path, &stats) {
                    warn!(error = %e, path = %path.display(), "Failed to write feed stats");
                }
            }
            feeds.push(stats);
        }

        let report = CycleReport { observed_at, feeds };
        info!(
            positions = report.positions(),
            estimates = report.estimates(),
            failed_feeds = report.failed_feeds(),
            "Poll cycle complete"
        );
        Ok(report)
    }

    async fn ingest(&self, endpoint: &FeedEndpoint, observed_at: DateTime<Utc>) -> Result<FeedStats> {
        let fetch_start = std::time::Instant::now();
        let bytes = match self.source.fetch(endpoint).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Feed fetch failed");
                return Ok(FeedStats::from_error("fetch_error", &format!("{e:#}")));
            }
        };

        let elapsed = fetch_start.elapsed();
        if elapsed.as_secs() > 15 {
            warn!(elapsed_secs = elapsed.as_secs(), "Feed fetch was slow");
        }
        debug!(bytes = bytes.len(), "Feed bytes received, parsing");

        let feed = match parse_feed(&bytes) {
            Ok(feed) => feed,
            Err(e) => {
                error!(error = %e, "Feed parse failed");
                return Ok(FeedStats::from_error("parse_error", &e.to_string()));
            }
        };

        let normalized = normalize_feed(&feed, endpoint, &self.stops, observed_at);
        if normalized.skipped_total() > 0 {
            debug!(skipped = ?normalized.skipped, "Entities skipped during normalization");
        }

        self.store
            .append(&normalized.positions, &normalized.estimates)
            .await?;

        let stats = FeedStats::from_feed(&feed).with_normalized(&normalized);
        info!(
            positions = stats.positions,
            estimates = stats.estimates,
            estimate_yield_pct = stats.estimate_yield_pct(),
            "Feed processed successfully"
        );
        Ok(stats)
    }
}

/// Runs a cycle every `interval` until the task is dropped. Cycles share the
/// poller lock with manual refreshes, so they never overlap.
pub async fn run_poll_loop(poller: Arc<Mutex<Poller>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = interval.as_secs(), "Starting poll loop");
    loop {
        ticker.tick().await;
        let poller = poller.lock().await;
        if let Err(e) = poller.run_cycle().await {
            error!(error = %e, "Poll cycle aborted");
        }
    }
}
