use serde::Serialize;
use std::collections::BTreeMap;

use super::delay::DelayRecord;
use super::utility::{mean, variance};

/// Delay distribution at one stop. One CSV row of the training output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopDelayStats {
    pub stop_id: String,
    pub stop_name: String,
    pub observations: usize,
    pub mean_delay_seconds: f64,
    pub mean_delay_minutes: f64,
    pub variance: f64,
    pub stddev_seconds: f64,
    pub min_delay_seconds: i64,
    pub max_delay_seconds: i64,
}

impl StopDelayStats {
    pub const HEADER: &'static [&'static str] = &[
        "stop_id",
        "stop_name",
        "observations",
        "mean_delay_seconds",
        "mean_delay_minutes",
        "variance",
        "stddev_seconds",
        "min_delay_seconds",
        "max_delay_seconds",
    ];
}

/// Groups records by stop, ordered by stop id.
pub fn aggregate_by_stop(records: &[DelayRecord]) -> Vec<StopDelayStats> {
    let mut by_stop: BTreeMap<&str, Vec<&DelayRecord>> = BTreeMap::new();
    for record in records {
        by_stop.entry(record.stop_id.as_str()).or_default().push(record);
    }

    by_stop
        .into_iter()
        .map(|(stop_id, group)| {
            let delays: Vec<f64> = group.iter().map(|r| r.delay_seconds as f64).collect();
            let m = mean(&delays);
            let var = variance(&delays, m);

            StopDelayStats {
                stop_id: stop_id.to_string(),
                stop_name: group[0].stop_name.clone(),
                observations: group.len(),
                mean_delay_seconds: m,
                mean_delay_minutes: m / 60.0,
                variance: var,
                stddev_seconds: var.sqrt(),
                min_delay_seconds: group.iter().map(|r| r.delay_seconds).min().unwrap_or(0),
                max_delay_seconds: group.iter().map(|r| r.delay_seconds).max().unwrap_or(0),
            }
        })
        .collect()
}
