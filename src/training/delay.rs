use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::Serialize;
use tracing::trace;

use super::observe::{ObservationSource, ObservedArrival};
use crate::model::{Direction, LineId};
use crate::schedule::{GtfsTime, Schedule};

/// Delays beyond two hours either way are matching errors, not lateness.
pub const MAX_ABS_DELAY_SECONDS: i64 = 7200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceDay {
    Weekday,
    Saturday,
    Sunday,
}

impl ServiceDay {
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat => ServiceDay::Saturday,
            Weekday::Sun => ServiceDay::Sunday,
            _ => ServiceDay::Weekday,
        }
    }
}

/// One observed arrival matched to its scheduled time. One CSV row of the
/// record-level training output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayRecord {
    pub line_id: LineId,
    pub trip_id: String,
    pub static_trip_id: String,
    pub direction: Direction,
    pub stop_id: String,
    pub stop_name: String,
    pub start_date: NaiveDate,
    pub service_day: ServiceDay,
    pub scheduled_arrival: GtfsTime,
    pub observed_arrival: DateTime<Utc>,
    pub observation: ObservationSource,
    pub delay_seconds: i64,
}

impl DelayRecord {
    pub const HEADER: &'static [&'static str] = &[
        "line_id",
        "trip_id",
        "static_trip_id",
        "direction",
        "stop_id",
        "stop_name",
        "start_date",
        "service_day",
        "scheduled_arrival",
        "observed_arrival",
        "observation",
        "delay_seconds",
    ];
}

#[derive(Debug, Default)]
pub struct DelayDerivation {
    pub records: Vec<DelayRecord>,
    pub unmatched: usize,
    pub out_of_range: usize,
}

/// Matches every observation against the static schedule. Observations
/// with no scheduled counterpart, or whose delay exceeds
/// [`MAX_ABS_DELAY_SECONDS`], are counted and dropped.
pub fn derive_delay_records(observations: &[ObservedArrival], schedule: &Schedule) -> DelayDerivation {
    let mut out = DelayDerivation::default();

    for obs in observations {
        let Some((trip, scheduled)) = schedule.scheduled_arrival(
            obs.line_id.as_str(),
            &obs.trip_id,
            obs.start_date,
            direction_id(obs),
            &obs.stop_id,
        ) else {
            trace!(trip_id = %obs.trip_id, stop_id = %obs.stop_id, "No scheduled arrival");
            out.unmatched += 1;
            continue;
        };

        let Some(scheduled_at) = scheduled.on_service_date(obs.start_date) else {
            out.unmatched += 1;
            continue;
        };

        let delay_seconds = (obs.arrival - scheduled_at).num_seconds();
        if delay_seconds.abs() >= MAX_ABS_DELAY_SECONDS {
            out.out_of_range += 1;
            continue;
        }

        let stop_name = schedule
            .stops
            .lookup(&obs.stop_id)
            .map(str::to_string)
            .or_else(|| obs.stop_name.clone())
            .unwrap_or_else(|| obs.stop_id.clone());

        out.records.push(DelayRecord {
            line_id: obs.line_id.clone(),
            trip_id: obs.trip_id.clone(),
            static_trip_id: trip.trip_id.clone(),
            direction: obs.direction,
            stop_id: obs.stop_id.clone(),
            stop_name,
            start_date: obs.start_date,
            service_day: ServiceDay::of(obs.start_date),
            scheduled_arrival: scheduled,
            observed_arrival: obs.arrival,
            observation: obs.source,
            delay_seconds,
        });
    }

    out
}

/// The feed's direction id, or the one implied by the stop suffix:
/// northbound trips are direction 0 in the NYCT static feed.
fn direction_id(obs: &ObservedArrival) -> Option<u32> {
    obs.direction_id.or(match obs.direction {
        Direction::Northbound => Some(0),
        Direction::Southbound => Some(1),
        Direction::Unknown => None,
    })
}
