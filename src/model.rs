//! Canonical records shared by ingestion, storage, the dashboard and the
//! training-set builder.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Timezone the agency publishes schedules in.
pub const AGENCY_TZ: Tz = chrono_tz::America::New_York;

/// A GTFS `route_id`, e.g. `"A"`, `"6X"` or `"SI"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct LineId(pub String);

impl LineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Track direction of a train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Direction {
    Northbound,
    Southbound,
    Unknown,
}

impl Direction {
    /// NYCT platform stop ids end in `N` or `S` (`"127N"`).
    pub fn from_stop_id(stop_id: &str) -> Self {
        match stop_id.chars().last() {
            Some('N') => Direction::Northbound,
            Some('S') => Direction::Southbound,
            _ => Direction::Unknown,
        }
    }

    /// NYCT trip ids carry the direction after the route, as in
    /// `"000650_1..S03R"` or `"061100_GS.N01R"`.
    pub fn from_trip_id(trip_id: &str) -> Self {
        let Some((_, rest)) = trip_id.split_once('_') else {
            return Direction::Unknown;
        };
        if !rest.contains('.') {
            return Direction::Unknown;
        }
        match rest.rsplit('.').next().and_then(|s| s.chars().next()) {
            Some('N') => Direction::Northbound,
            Some('S') => Direction::Southbound,
            _ => Direction::Unknown,
        }
    }

    /// Stop suffix first, trip id as a fallback.
    pub fn derive(stop_id: &str, trip_id: &str) -> Self {
        match Self::from_stop_id(stop_id) {
            Direction::Unknown => Self::from_trip_id(trip_id),
            known => known,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Northbound => "Northbound",
            Direction::Southbound => "Southbound",
            Direction::Unknown => "Unknown",
        }
    }
}

/// Where a vehicle is relative to `stop_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VehicleStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
}

impl VehicleStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VehicleStatus::IncomingAt => "Arriving at",
            VehicleStatus::StoppedAt => "Stopped at",
            VehicleStatus::InTransitTo => "In transit to",
        }
    }
}

/// One observed snapshot of a single train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VehiclePosition {
    pub line_id: LineId,
    pub trip_id: String,
    pub start_date: NaiveDate,
    pub direction: Direction,
    /// Current stop when stopped, otherwise the next stop.
    pub stop_id: String,
    pub status: VehicleStatus,
    pub timestamp: DateTime<Utc>,
    /// Start of the poll cycle that recorded this row.
    pub observed_at: DateTime<Utc>,
}

/// A predicted arrival of one trip at one stop, as published in one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StopEstimate {
    pub line_id: LineId,
    pub trip_id: String,
    pub start_date: NaiveDate,
    pub start_time: Option<String>,
    pub direction_id: Option<i64>,
    pub direction: Direction,
    pub stop_id: String,
    pub stop_name: String,
    pub arrival_time: DateTime<Utc>,
    pub departure_time: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}
