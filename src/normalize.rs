//! Maps a decoded GTFS-RT feed into canonical [`VehiclePosition`] and
//! [`StopEstimate`] records.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::feeds::FeedEndpoint;
use crate::gtfs_rt::{FeedMessage, TripDescriptor, trip_update, vehicle_position};
use crate::model::{AGENCY_TZ, Direction, LineId, StopEstimate, VehicleStatus, VehiclePosition};
use crate::schedule::StopNames;

/// Why an entity or stop time update was left out.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkipReason {
    #[error("line '{0}' is not served by this endpoint")]
    UnknownLine(String),
    #[error("trip descriptor has no trip id")]
    MissingTripId,
    #[error("vehicle has no trip descriptor")]
    MissingTrip,
    #[error("no stop id")]
    MissingStopId,
    #[error("no usable timestamp")]
    MissingTime,
    #[error("unparseable start date '{0}'")]
    BadStartDate(String),
}

impl SkipReason {
    /// Stable label for counters and CSV output.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::UnknownLine(_) => "unknown_line",
            SkipReason::MissingTripId | SkipReason::MissingTrip => "missing_trip",
            SkipReason::MissingStopId => "missing_stop",
            SkipReason::MissingTime => "missing_time",
            SkipReason::BadStartDate(_) => "bad_start_date",
        }
    }
}

/// Output of normalizing one feed.
#[derive(Debug, Default)]
pub struct Normalized {
    pub positions: Vec<VehiclePosition>,
    pub estimates: Vec<StopEstimate>,
    /// Skip counts keyed by [`SkipReason::kind`].
    pub skipped: BTreeMap<&'static str, usize>,
}

impl Normalized {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    fn skip(&mut self, entity_id: &str, reason: SkipReason) {
        debug!(entity_id, %reason, "Skipping feed entity");
        *self.skipped.entry(reason.kind()).or_default() += 1;
    }
}

/// Normalizes every entity of `feed` as published by `endpoint`.
///
/// Entities reporting a line the endpoint does not serve, or lacking a trip,
/// a stop or a time, are counted in [`Normalized::skipped`] and left out.
pub fn normalize_feed(
    feed: &FeedMessage,
    endpoint: &FeedEndpoint,
    stops: &StopNames,
    observed_at: DateTime<Utc>,
) -> Normalized {
    let mut out = Normalized::default();
    let header_time = feed.header.timestamp.and_then(epoch);

    for entity in &feed.entity {
        if entity.is_deleted() {
            continue;
        }

        if let Some(vehicle) = &entity.vehicle {
            match normalize_vehicle(vehicle, endpoint, header_time, observed_at) {
                Ok(position) => out.positions.push(position),
                Err(reason) => out.skip(&entity.id, reason),
            }
        }

        if let Some(update) = &entity.trip_update {
            let trip = match TripKey::from_descriptor(&update.trip, endpoint) {
                Ok(trip) => trip,
                Err(reason) => {
                    out.skip(&entity.id, reason);
                    continue;
                }
            };

            for stu in &update.stop_time_update {
                match normalize_stop_time(&trip, &update.trip, stu, stops, header_time, observed_at)
                {
                    Ok(estimate) => out.estimates.push(estimate),
                    Err(reason) => out.skip(&entity.id, reason),
                }
            }
        }
    }

    out
}

/// Validated identity of a trip within one endpoint.
struct TripKey {
    line_id: LineId,
    trip_id: String,
    start_date: Option<NaiveDate>,
}

impl TripKey {
    fn from_descriptor(trip: &TripDescriptor, endpoint: &FeedEndpoint) -> Result<Self, SkipReason> {
        let route_id = trip.route_id();
        if !endpoint.serves(route_id) {
            return Err(SkipReason::UnknownLine(route_id.to_string()));
        }

        let trip_id = trip.trip_id();
        if trip_id.is_empty() {
            return Err(SkipReason::MissingTripId);
        }

        let start_date = match trip.start_date.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y%m%d")
                    .map_err(|_| SkipReason::BadStartDate(raw.to_string()))?,
            ),
        };

        Ok(Self {
            line_id: LineId::new(route_id),
            trip_id: trip_id.to_string(),
            start_date,
        })
    }

    /// Feed start date, or the agency-local date of `at` when absent.
    fn start_date_or(&self, at: DateTime<Utc>) -> NaiveDate {
        self.start_date
            .unwrap_or_else(|| at.with_timezone(&AGENCY_TZ).date_naive())
    }
}

fn normalize_vehicle(
    vehicle: &crate::gtfs_rt::VehiclePosition,
    endpoint: &FeedEndpoint,
    header_time: Option<DateTime<Utc>>,
    observed_at: DateTime<Utc>,
) -> Result<VehiclePosition, SkipReason> {
    let descriptor = vehicle.trip.as_ref().ok_or(SkipReason::MissingTrip)?;
    let trip = TripKey::from_descriptor(descriptor, endpoint)?;

    let stop_id = vehicle.stop_id();
    if stop_id.is_empty() {
        return Err(SkipReason::MissingStopId);
    }

    let timestamp = vehicle
        .timestamp
        .and_then(epoch)
        .or(header_time)
        .ok_or(SkipReason::MissingTime)?;

    let status = match vehicle.current_status() {
        vehicle_position::VehicleStopStatus::IncomingAt => VehicleStatus::IncomingAt,
        vehicle_position::VehicleStopStatus::StoppedAt => VehicleStatus::StoppedAt,
        vehicle_position::VehicleStopStatus::InTransitTo => VehicleStatus::InTransitTo,
    };

    Ok(VehiclePosition {
        start_date: trip.start_date_or(timestamp),
        direction: Direction::derive(stop_id, &trip.trip_id),
        line_id: trip.line_id,
        trip_id: trip.trip_id,
        stop_id: stop_id.to_string(),
        status,
        timestamp,
        observed_at,
    })
}

fn normalize_stop_time(
    trip: &TripKey,
    descriptor: &TripDescriptor,
    stu: &trip_update::StopTimeUpdate,
    stops: &StopNames,
    header_time: Option<DateTime<Utc>>,
    observed_at: DateTime<Utc>,
) -> Result<StopEstimate, SkipReason> {
    let stop_id = stu.stop_id();
    if stop_id.is_empty() {
        return Err(SkipReason::MissingStopId);
    }

    // Origin stops only publish a departure and terminals only an arrival.
    let arrival = event_time(stu.arrival.as_ref());
    let departure = event_time(stu.departure.as_ref());
    let (arrival_time, departure_time) = match (arrival, departure) {
        (Some(a), Some(d)) => (a, d),
        (Some(a), None) => (a, a),
        (None, Some(d)) => (d, d),
        (None, None) => return Err(SkipReason::MissingTime),
    };

    let start_date = trip.start_date_or(header_time.unwrap_or(arrival_time));

    Ok(StopEstimate {
        line_id: trip.line_id.clone(),
        trip_id: trip.trip_id.clone(),
        start_date,
        start_time: descriptor
            .start_time
            .clone()
            .filter(|s| !s.is_empty()),
        direction_id: descriptor.direction_id.map(i64::from),
        direction: Direction::derive(stop_id, &trip.trip_id),
        stop_id: stop_id.to_string(),
        stop_name: stops.name_or_id(stop_id),
        arrival_time,
        departure_time,
        observed_at,
    })
}

fn event_time(event: Option<&trip_update::StopTimeEvent>) -> Option<DateTime<Utc>> {
    event.and_then(|e| e.time).and_then(|t| u64::try_from(t).ok()).and_then(epoch)
}

/// POSIX seconds to a UTC instant; zero is treated as unset.
fn epoch(seconds: u64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::try_from(seconds).ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FeedCatalog;
    use crate::gtfs_rt::{FeedEntity, FeedHeader, TripUpdate};

    const NOW: i64 = 1_700_000_000;

    fn observed_at() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW + 30, 0).unwrap()
    }

    fn ace() -> FeedEndpoint {
        FeedCatalog::mta_subway().endpoints()[1].clone()
    }

    fn header() -> FeedHeader {
        FeedHeader {
            gtfs_realtime_version: "1.0".to_string(),
            timestamp: Some(NOW as u64),
            ..Default::default()
        }
    }

    fn descriptor(route: &str, trip: &str) -> TripDescriptor {
        TripDescriptor {
            trip_id: Some(trip.to_string()),
            route_id: Some(route.to_string()),
            start_date: Some("20231114".to_string()),
            start_time: Some("01:06:30".to_string()),
            ..Default::default()
        }
    }

    fn vehicle_entity(route: &str, trip: &str, stop: &str) -> FeedEntity {
        FeedEntity {
            id: format!("v-{trip}"),
            vehicle: Some(crate::gtfs_rt::VehiclePosition {
                trip: Some(descriptor(route, trip)),
                stop_id: Some(stop.to_string()),
                current_status: Some(vehicle_position::VehicleStopStatus::StoppedAt as i32),
                timestamp: Some(NOW as u64 - 10),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn stop_time(stop: &str, arrival: Option<i64>, departure: Option<i64>) -> trip_update::StopTimeUpdate {
        trip_update::StopTimeUpdate {
            stop_id: Some(stop.to_string()),
            arrival: arrival.map(|t| trip_update::StopTimeEvent {
                time: Some(t),
                ..Default::default()
            }),
            departure: departure.map(|t| trip_update::StopTimeEvent {
                time: Some(t),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn trip_update_entity(route: &str, trip: &str, stus: Vec<trip_update::StopTimeUpdate>) -> FeedEntity {
        FeedEntity {
            id: format!("t-{trip}"),
            trip_update: Some(TripUpdate {
                trip: descriptor(route, trip),
                stop_time_update: stus,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_vehicle_fields_are_populated() {
        let feed = FeedMessage {
            header: header(),
            entity: vec![vehicle_entity("A", "006650_A..S", "A02S")],
        };

        let out = normalize_feed(&feed, &ace(), &StopNames::default(), observed_at());

        assert_eq!(out.positions.len(), 1);
        let p = &out.positions[0];
        assert_eq!(p.line_id, LineId::from("A"));
        assert_eq!(p.trip_id, "006650_A..S");
        assert_eq!(p.start_date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
        assert_eq!(p.direction, Direction::Southbound);
        assert_eq!(p.stop_id, "A02S");
        assert_eq!(p.status, VehicleStatus::StoppedAt);
        assert_eq!(p.timestamp.timestamp(), NOW - 10);
        assert_eq!(p.observed_at, observed_at());
    }

    #[test]
    fn test_every_catalog_line_yields_a_complete_position() {
        let catalog = FeedCatalog::mta_subway();

        for endpoint in catalog.endpoints() {
            for line in &endpoint.lines {
                let trip_id = format!("012300_{line}..N");
                let stop_id = format!("{line}01N");
                let feed = FeedMessage {
                    header: header(),
                    entity: vec![vehicle_entity(line.as_str(), &trip_id, &stop_id)],
                };

                let out = normalize_feed(&feed, endpoint, &StopNames::default(), observed_at());

                assert_eq!(out.positions.len(), 1, "line {line} on {}", endpoint.name);
                assert_eq!(out.skipped_total(), 0, "line {line}");
                let p = &out.positions[0];
                assert!(catalog.is_known(p.line_id.as_str()), "line {line}");
                assert_eq!(&p.line_id, line);
                assert_eq!(p.trip_id, trip_id);
                assert_eq!(p.start_date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
                assert_eq!(p.direction, Direction::Northbound);
                assert_eq!(p.stop_id, stop_id);
                assert_eq!(p.status, VehicleStatus::StoppedAt);
                assert_eq!(p.timestamp.timestamp(), NOW - 10);
                assert_eq!(p.observed_at, observed_at());
            }
        }
    }

    #[test]
    fn test_vehicle_without_timestamp_uses_header() {
        let mut entity = vehicle_entity("C", "010000_C..N", "A09N");
        entity.vehicle.as_mut().unwrap().timestamp = None;
        let feed = FeedMessage {
            header: header(),
            entity: vec![entity],
        };

        let out = normalize_feed(&feed, &ace(), &StopNames::default(), observed_at());
        assert_eq!(out.positions[0].timestamp.timestamp(), NOW);
    }

    #[test]
    fn test_unknown_line_is_skipped() {
        let feed = FeedMessage {
            header: header(),
            entity: vec![
                vehicle_entity("L", "000100_L..N", "L01N"),
                vehicle_entity("E", "000200_E..N", "F01N"),
            ],
        };

        let out = normalize_feed(&feed, &ace(), &StopNames::default(), observed_at());

        assert_eq!(out.positions.len(), 1);
        assert_eq!(out.positions[0].line_id, LineId::from("E"));
        assert_eq!(out.skipped.get("unknown_line"), Some(&1));
    }

    #[test]
    fn test_stop_time_updates_become_estimates() {
        let stops = StopNames::load(
            "stop_id,stop_name\nA02,Inwood-207 St\nA03,Dyckman St\n".as_bytes(),
        )
        .unwrap();
        let feed = FeedMessage {
            header: header(),
            entity: vec![trip_update_entity(
                "A",
                "006650_A..S",
                vec![
                    stop_time("A02S", None, Some(NOW + 60)),
                    stop_time("A03S", Some(NOW + 150), Some(NOW + 170)),
                    stop_time("A05S", Some(NOW + 300), None),
                ],
            )],
        };

        let out = normalize_feed(&feed, &ace(), &stops, observed_at());

        assert_eq!(out.estimates.len(), 3);
        let first = &out.estimates[0];
        assert_eq!(first.stop_name, "Inwood-207 St");
        assert_eq!(first.arrival_time, first.departure_time);
        assert_eq!(first.start_time.as_deref(), Some("01:06:30"));
        assert_eq!(first.direction, Direction::Southbound);

        assert_eq!(out.estimates[1].arrival_time.timestamp(), NOW + 150);
        assert_eq!(out.estimates[1].departure_time.timestamp(), NOW + 170);
        assert_eq!(out.estimates[2].stop_name, "A05S");
    }

    #[test]
    fn test_stop_time_without_times_is_skipped() {
        let feed = FeedMessage {
            header: header(),
            entity: vec![trip_update_entity(
                "H",
                "010000_H..N",
                vec![stop_time("H04N", None, None), stop_time("H03N", Some(NOW), None)],
            )],
        };

        let out = normalize_feed(&feed, &ace(), &StopNames::default(), observed_at());

        assert_eq!(out.estimates.len(), 1);
        assert_eq!(out.skipped.get("missing_time"), Some(&1));
    }

    #[test]
    fn test_missing_trip_id_and_bad_date() {
        let mut no_trip = trip_update_entity("A", "x", vec![stop_time("A02S", Some(NOW), None)]);
        no_trip.trip_update.as_mut().unwrap().trip.trip_id = None;
        let mut bad_date = trip_update_entity("A", "y", vec![stop_time("A02S", Some(NOW), None)]);
        bad_date.trip_update.as_mut().unwrap().trip.start_date = Some("2023-11-14".to_string());

        let feed = FeedMessage {
            header: header(),
            entity: vec![no_trip, bad_date],
        };
        let out = normalize_feed(&feed, &ace(), &StopNames::default(), observed_at());

        assert!(out.estimates.is_empty());
        assert_eq!(out.skipped.get("missing_trip"), Some(&1));
        assert_eq!(out.skipped.get("bad_start_date"), Some(&1));
        assert_eq!(out.skipped_total(), 2);
    }

    #[test]
    fn test_missing_start_date_uses_local_date() {
        // 2023-11-15T03:00:00Z is still the 14th in New York
        let late = 1_700_017_200;
        let mut entity = trip_update_entity("A", "140000_A..N", vec![stop_time("A02N", Some(late), None)]);
        entity.trip_update.as_mut().unwrap().trip.start_date = None;
        let feed = FeedMessage {
            header: FeedHeader {
                timestamp: Some(late as u64),
                ..header()
            },
            entity: vec![entity],
        };

        let out = normalize_feed(&feed, &ace(), &StopNames::default(), observed_at());
        assert_eq!(
            out.estimates[0].start_date,
            NaiveDate::from_ymd_opt(2023, 11, 14).unwrap()
        );
    }
}
