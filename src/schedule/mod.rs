//! Static GTFS schedule: the reference the training set measures delays
//! against.

mod calendar;
mod stop_times;
mod stops;
mod time;
mod trips;

pub use calendar::{Calendar, parse_date};
pub use stop_times::StopTimes;
pub use stops::StopNames;
pub use time::GtfsTime;
pub use trips::{StaticTrip, TripIndex, realtime_origin_key, static_origin_key};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::File;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub stops: StopNames,
    pub calendar: Calendar,
    pub trips: TripIndex,
    pub stop_times: StopTimes,
}

impl Schedule {
    /// Loads `calendar.txt`, `trips.txt` and `stop_times.txt` (required) plus
    /// `stops.txt` and `calendar_dates.txt` (optional) from `dir`.
    #[tracing::instrument(fields(dir = %dir.display()))]
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let calendar_path = dir.join("calendar.txt");
        let mut calendar = Calendar::load(open(&calendar_path)?)
            .with_context(|| format!("loading {}", calendar_path.display()))?;

        let exceptions_path = dir.join("calendar_dates.txt");
        if exceptions_path.exists() {
            calendar
                .load_exceptions(open(&exceptions_path)?)
                .with_context(|| format!("loading {}", exceptions_path.display()))?;
        }

        let trips_path = dir.join("trips.txt");
        let trips = TripIndex::load(open(&trips_path)?)
            .with_context(|| format!("loading {}", trips_path.display()))?;

        let stop_times_path = dir.join("stop_times.txt");
        let stop_times = StopTimes::load(open(&stop_times_path)?)
            .with_context(|| format!("loading {}", stop_times_path.display()))?;

        let stops = load_stop_names(dir)?;

        info!(
            trips = trips.len(),
            stop_times = stop_times.len(),
            stops = stops.len(),
            "Static schedule loaded"
        );

        Ok(Self {
            stops,
            calendar,
            trips,
            stop_times,
        })
    }

    /// Scheduled arrival of a realtime trip at `stop_id` on `start_date`,
    /// together with the static trip it was matched to: the first candidate
    /// trip that actually serves the stop.
    pub fn scheduled_arrival(
        &self,
        route_id: &str,
        realtime_trip_id: &str,
        start_date: NaiveDate,
        direction_id: Option<u32>,
        stop_id: &str,
    ) -> Option<(&StaticTrip, GtfsTime)> {
        let services = self.calendar.active_services(start_date);
        if services.is_empty() {
            return None;
        }
        self.trips
            .candidates(route_id, realtime_trip_id, &services, direction_id)
            .find_map(|trip| {
                self.stop_times
                    .arrival(&trip.trip_id, stop_id)
                    .map(|arrival| (trip, arrival))
            })
    }
}

/// Loads `stops.txt` from `dir`, or an empty table when the file is absent.
pub fn load_stop_names(dir: &Path) -> Result<StopNames> {
    let path = dir.join("stops.txt");
    if !path.exists() {
        return Ok(StopNames::default());
    }
    StopNames::load(open(&path)?).with_context(|| format!("loading {}", path.display()))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("could not open required GTFS file {}", path.display()))
}
