use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::model::{Direction, LineId, StopEstimate, VehicleStatus, VehiclePosition};

/// Estimates published further ahead than this are predictions, not
/// observations, and are never used as an arrival.
pub const MAX_ESTIMATE_LEAD_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    /// A vehicle reported itself stopped at the stop.
    Vehicle,
    /// The last arrival estimate published before the stop dropped out of
    /// the trip update.
    Estimate,
}

/// Best known actual arrival of one trip at one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedArrival {
    pub line_id: LineId,
    pub trip_id: String,
    pub start_date: NaiveDate,
    pub direction: Direction,
    pub direction_id: Option<u32>,
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub arrival: DateTime<Utc>,
    pub source: ObservationSource,
}

type Key = (NaiveDate, LineId, String, String);

/// Reduces position and estimate history to one arrival per trip, service
/// date and stop, ordered by that key.
///
/// The first `StoppedAt` report wins; otherwise the most recently observed
/// estimate, provided it was published at most
/// [`MAX_ESTIMATE_LEAD_MINUTES`] before the arrival it predicts.
pub fn observed_arrivals(
    positions: &[VehiclePosition],
    estimates: &[StopEstimate],
) -> Vec<ObservedArrival> {
    let max_lead = Duration::minutes(MAX_ESTIMATE_LEAD_MINUTES);

    let mut latest_estimates: BTreeMap<Key, &StopEstimate> = BTreeMap::new();
    for estimate in estimates {
        let key = (
            estimate.start_date,
            estimate.line_id.clone(),
            estimate.trip_id.clone(),
            estimate.stop_id.clone(),
        );
        match latest_estimates.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(estimate);
            }
            Entry::Occupied(mut slot) => {
                if estimate.observed_at >= slot.get().observed_at {
                    slot.insert(estimate);
                }
            }
        }
    }

    let mut first_stops: BTreeMap<Key, &VehiclePosition> = BTreeMap::new();
    for position in positions.iter().filter(|p| p.status == VehicleStatus::StoppedAt) {
        let key = (
            position.start_date,
            position.line_id.clone(),
            position.trip_id.clone(),
            position.stop_id.clone(),
        );
        match first_stops.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(position);
            }
            Entry::Occupied(mut slot) => {
                if position.timestamp < slot.get().timestamp {
                    slot.insert(position);
                }
            }
        }
    }

    let mut arrivals: BTreeMap<Key, ObservedArrival> = BTreeMap::new();

    for (key, estimate) in &latest_estimates {
        if estimate.arrival_time - estimate.observed_at > max_lead {
            continue;
        }
        arrivals.insert(
            key.clone(),
            ObservedArrival {
                line_id: estimate.line_id.clone(),
                trip_id: estimate.trip_id.clone(),
                start_date: estimate.start_date,
                direction: estimate.direction,
                direction_id: estimate.direction_id.and_then(|d| u32::try_from(d).ok()),
                stop_id: estimate.stop_id.clone(),
                stop_name: Some(estimate.stop_name.clone()),
                arrival: estimate.arrival_time,
                source: ObservationSource::Estimate,
            },
        );
    }

    for (key, position) in first_stops {
        let estimate = latest_estimates.get(&key);
        arrivals.insert(
            key,
            ObservedArrival {
                line_id: position.line_id.clone(),
                trip_id: position.trip_id.clone(),
                start_date: position.start_date,
                direction: position.direction,
                direction_id: estimate
                    .and_then(|e| e.direction_id)
                    .and_then(|d| u32::try_from(d).ok()),
                stop_id: position.stop_id.clone(),
                stop_name: estimate.map(|e| e.stop_name.clone()),
                arrival: position.timestamp,
                source: ObservationSource::Vehicle,
            },
        );
    }

    arrivals.into_values().collect()
}
