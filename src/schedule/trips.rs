use anyhow::Result;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;

/// A trip from `trips.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticTrip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub direction_id: Option<u32>,
}

/// Static trips keyed by route and origin-time key.
#[derive(Debug, Clone, Default)]
pub struct TripIndex {
    by_origin: HashMap<(String, String), Vec<StaticTrip>>,
    len: usize,
}

impl TripIndex {
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut index = TripIndex::default();
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: Record = rec?;
            index.insert(StaticTrip {
                trip_id: rec.trip_id,
                route_id: rec.route_id,
                service_id: rec.service_id,
                direction_id: rec.direction_id,
            });
        }
        Ok(index)
    }

    pub fn insert(&mut self, trip: StaticTrip) {
        let key = (
            trip.route_id.clone(),
            static_origin_key(&trip.trip_id).to_string(),
        );
        self.by_origin.entry(key).or_default().push(trip);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Static trips a realtime trip may run as: same route and origin time,
    /// a service active that day, and the same direction when the realtime
    /// feed reports one. Several branches can share an origin time, so
    /// callers pick among them; candidates come in file order.
    pub fn candidates<'a, 's>(
        &'a self,
        route_id: &str,
        realtime_trip_id: &str,
        services: &'s BTreeSet<String>,
        direction_id: Option<u32>,
    ) -> impl Iterator<Item = &'a StaticTrip> {
        let key = (
            route_id.to_string(),
            realtime_origin_key(realtime_trip_id).to_string(),
        );
        self.by_origin
            .get(&key)
            .into_iter()
            .flatten()
            .filter(move |t| {
                services.contains(&t.service_id)
                    && match (direction_id, t.direction_id) {
                        (Some(rt), Some(st)) => rt == st,
                        _ => true,
                    }
            })
    }
}

/// Origin-time key of a realtime NYCT trip id: `"000650_1..S03R"` gives
/// `"000650"`.
pub fn realtime_origin_key(trip_id: &str) -> &str {
    trip_id.split('_').next().unwrap_or(trip_id)
}

/// Origin-time key of a static NYCT trip id:
/// `"AFA23GEN-1038-Sunday-00_000600_1..S03R"` gives `"000600"`.
pub fn static_origin_key(trip_id: &str) -> &str {
    match trip_id.split_once('_') {
        Some((_, rest)) => rest.split('_').next().unwrap_or(rest),
        None => trip_id,
    }
}

#[derive(Deserialize)]
struct Record {
    route_id: String,
    service_id: String,
    trip_id: String,
    direction_id: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIPS: &str = "route_id,trip_id,service_id,trip_headsign,direction_id,shape_id
1,AFA23GEN-1038-Weekday-00_000600_1..S03R,Weekday,South Ferry,1,1..S03R
1,AFA23GEN-1038-Sunday-00_000600_1..S03R,Sunday,South Ferry,1,1..S03R
1,AFA23GEN-1038-Weekday-00_000650_1..N03R,Weekday,Van Cortlandt Park-242 St,0,1..N03R
";

    fn services(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_origin_keys() {
        assert_eq!(realtime_origin_key("000650_1..S03R"), "000650");
        assert_eq!(realtime_origin_key("000650"), "000650");
        assert_eq!(
            static_origin_key("AFA23GEN-1038-Sunday-00_000600_1..S03R"),
            "000600"
        );
        assert_eq!(static_origin_key("plain"), "plain");
    }

    #[test]
    fn test_candidates_by_service() {
        let index = TripIndex::load(TRIPS.as_bytes()).unwrap();
        assert_eq!(index.len(), 3);

        let sunday = services(&["Sunday"]);
        let trips: Vec<_> = index
            .candidates("1", "000600_1..S03R", &sunday, None)
            .map(|t| t.trip_id.as_str())
            .collect();
        assert_eq!(trips, vec!["AFA23GEN-1038-Sunday-00_000600_1..S03R"]);
    }

    #[test]
    fn test_candidates_respect_direction() {
        let index = TripIndex::load(TRIPS.as_bytes()).unwrap();
        let weekday = services(&["Weekday"]);

        assert_eq!(index.candidates("1", "000650_1..N03R", &weekday, Some(0)).count(), 1);
        assert_eq!(index.candidates("1", "000650_1..N03R", &weekday, Some(1)).count(), 0);
    }

    #[test]
    fn test_candidates_unknown_route() {
        let index = TripIndex::load(TRIPS.as_bytes()).unwrap();
        let weekday = services(&["Weekday"]);
        assert_eq!(index.candidates("2", "000600_2..S", &weekday, None).count(), 0);
    }
}
