//! Offline training-set builder: joins stored history with the static
//! schedule and writes per-stop delay aggregates.

mod aggregate;
mod delay;
mod observe;
mod utility;

pub use aggregate::{StopDelayStats, aggregate_by_stop};
pub use delay::{DelayDerivation, DelayRecord, MAX_ABS_DELAY_SECONDS, ServiceDay, derive_delay_records};
pub use observe::{MAX_ESTIMATE_LEAD_MINUTES, ObservationSource, ObservedArrival, observed_arrivals};

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::output::write_records;
use crate::schedule::Schedule;
use crate::store::Store;

/// Bounds `[from, to)` on `observed_at` for the history a build reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        let all = Self::default();
        Self {
            from: from.unwrap_or(all.from),
            to: to.unwrap_or(all.to),
        }
    }
}

impl Default for TimeRange {
    /// 1970 through 9999. Kept within four-digit years so the bounds
    /// compare correctly against timestamps stored as text.
    fn default() -> Self {
        let from = DateTime::UNIX_EPOCH;
        let to = NaiveDate::from_ymd_opt(9999, 12, 31)
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { from, to }
    }
}

#[derive(Debug)]
pub struct TrainingSet {
    pub records: Vec<DelayRecord>,
    pub stops: Vec<StopDelayStats>,
}

/// Reads all history in `range` and derives delay records and per-stop
/// aggregates. Fails when the store holds no history in range.
#[tracing::instrument(skip(store, schedule), err)]
pub async fn build_training_set(store: &Store, schedule: &Schedule, range: TimeRange) -> Result<TrainingSet> {
    let positions = store.positions_between(range.from, range.to, None).await?;
    let estimates = store.estimates_between(range.from, range.to, None).await?;
    if positions.is_empty() && estimates.is_empty() {
        bail!("no stored history between {} and {}; run the poller first", range.from, range.to);
    }

    let observations = observed_arrivals(&positions, &estimates);
    let derivation = derive_delay_records(&observations, schedule);

    info!(
        positions = positions.len(),
        estimates = estimates.len(),
        observations = observations.len(),
        matched = derivation.records.len(),
        unmatched = derivation.unmatched,
        out_of_range = derivation.out_of_range,
        "Delay records derived"
    );
    if derivation.records.is_empty() {
        warn!("No observation matched the static schedule; the training set is empty");
    }

    let stops = aggregate_by_stop(&derivation.records);
    Ok(TrainingSet {
        records: derivation.records,
        stops,
    })
}

/// Writes the per-stop aggregates to `output` and, when given, the
/// individual delay records to `records_output`. Existing files are
/// replaced.
pub fn write_training_set(set: &TrainingSet, output: &Path, records_output: Option<&Path>) -> Result<()> {
    write_records(output, StopDelayStats::HEADER, &set.stops)?;
    info!(path = %output.display(), stops = set.stops.len(), "Training data written");

    if let Some(path) = records_output {
        write_records(path, DelayRecord::HEADER, &set.records)?;
        info!(path = %path.display(), records = set.records.len(), "Delay records written");
    }
    Ok(())
}
