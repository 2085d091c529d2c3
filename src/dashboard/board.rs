use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{AGENCY_TZ, Direction, LineId, StopEstimate, VehiclePosition};

/// The live view of one line: the trains of the latest poll, grouped by
/// direction.
#[derive(Debug, Clone, Serialize)]
pub struct LineBoard {
    pub line: LineId,
    pub observed_at: Option<DateTime<Utc>>,
    pub directions: Vec<DirectionBoard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectionBoard {
    pub direction: Direction,
    pub label: &'static str,
    pub trains: Vec<TrainRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainRow {
    pub trip_id: String,
    pub status: Option<String>,
    pub stops: Vec<StopRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopRow {
    pub stop_id: String,
    pub stop_name: String,
    pub arrival: DateTime<Utc>,
    /// Arrival as New York wall-clock time, `HH:MM:SS`.
    pub arrival_local: String,
}

impl LineBoard {
    /// Builds the board from the latest poll's estimates and positions.
    ///
    /// Northbound and southbound are always present, possibly empty;
    /// trains without a known direction are listed last when there are any.
    /// Each train's stops are in arrival order.
    pub fn build(line: LineId, positions: &[VehiclePosition], estimates: &[StopEstimate]) -> Self {
        let observed_at = estimates
            .iter()
            .map(|e| e.observed_at)
            .chain(positions.iter().map(|p| p.observed_at))
            .max();

        let mut status: BTreeMap<&str, &VehiclePosition> = BTreeMap::new();
        for position in positions {
            status.insert(position.trip_id.as_str(), position);
        }

        let mut grouped: BTreeMap<Direction, BTreeMap<&str, Vec<&StopEstimate>>> = BTreeMap::new();
        for estimate in estimates {
            grouped
                .entry(estimate.direction)
                .or_default()
                .entry(estimate.trip_id.as_str())
                .or_default()
                .push(estimate);
        }

        let mut directions = Vec::new();
        for direction in [Direction::Northbound, Direction::Southbound, Direction::Unknown] {
            let trips = grouped.remove(&direction).unwrap_or_default();
            if direction == Direction::Unknown && trips.is_empty() {
                continue;
            }

            let trains = trips
                .into_iter()
                .map(|(trip_id, mut stops)| {
                    stops.sort_by_key(|e| e.arrival_time);
                    TrainRow {
                        trip_id: trip_id.to_string(),
                        status: status.get(trip_id).map(|p| describe(p)),
                        stops: stops.into_iter().map(stop_row).collect(),
                    }
                })
                .collect();

            directions.push(DirectionBoard {
                direction,
                label: direction.label(),
                trains,
            });
        }

        Self {
            line,
            observed_at,
            directions,
        }
    }

    pub fn train_count(&self) -> usize {
        self.directions.iter().map(|d| d.trains.len()).sum()
    }
}

fn describe(position: &VehiclePosition) -> String {
    format!("{} {}", position.status.label(), position.stop_id)
}

fn stop_row(estimate: &StopEstimate) -> StopRow {
    StopRow {
        stop_id: estimate.stop_id.clone(),
        stop_name: estimate.stop_name.clone(),
        arrival: estimate.arrival_time,
        arrival_local: local_time(estimate.arrival_time),
    }
}

/// `HH:MM:SS` in New York time.
pub fn local_time(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&AGENCY_TZ).format("%H:%M:%S").to_string()
}
