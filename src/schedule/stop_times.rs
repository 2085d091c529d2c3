use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use super::GtfsTime;

/// Scheduled arrival per `(trip_id, stop_id)`, from `stop_times.txt`.
#[derive(Debug, Clone, Default)]
pub struct StopTimes(HashMap<(String, String), GtfsTime>);

impl StopTimes {
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut arrivals = HashMap::new();
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: Record = rec?;
            // Untimed stops leave arrival empty; fall back to departure.
            let raw = match (rec.arrival_time.as_deref(), rec.departure_time.as_deref()) {
                (Some(a), _) if !a.trim().is_empty() => a,
                (_, Some(d)) if !d.trim().is_empty() => d,
                _ => continue,
            };
            arrivals.insert((rec.trip_id, rec.stop_id), GtfsTime::parse(raw)?);
        }
        Ok(Self(arrivals))
    }

    pub fn insert(&mut self, trip_id: &str, stop_id: &str, arrival: GtfsTime) {
        self.0
            .insert((trip_id.to_string(), stop_id.to_string()), arrival);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn arrival(&self, trip_id: &str, stop_id: &str) -> Option<GtfsTime> {
        self.0
            .get(&(trip_id.to_string(), stop_id.to_string()))
            .copied()
    }
}

#[derive(Deserialize)]
struct Record {
    trip_id: String,
    stop_id: String,
    arrival_time: Option<String>,
    departure_time: Option<String>,
}
