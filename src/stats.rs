use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gtfs_rt::FeedMessage;
use crate::normalize::Normalized;

/// Per-endpoint outcome of one poll cycle, one CSV row each.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FeedStats {
    pub timestamp: DateTime<Utc>,
    pub feed_name: Option<String>,
    pub feed_url: Option<String>,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub total_entities: usize,

    // entity types
    pub vehicles: usize,
    pub trip_updates: usize,
    pub stop_time_updates: usize,

    // normalization
    pub positions: usize,
    pub estimates: usize,
    pub skipped_unknown_line: usize,
    pub skipped_missing_trip: usize,
    pub skipped_missing_stop: usize,
    pub skipped_missing_time: usize,
    pub skipped_bad_start_date: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl FeedStats {
    pub fn from_feed(feed: &FeedMessage) -> Self {
        let mut s = FeedStats {
            timestamp: Utc::now(),
            feed_timestamp: feed
                .header
                .timestamp
                .and_then(|t| i64::try_from(t).ok())
                .and_then(|t| DateTime::from_timestamp(t, 0)),
            total_entities: feed.entity.len(),
            ..Default::default()
        };

        for e in &feed.entity {
            if e.vehicle.is_some() {
                s.vehicles += 1;
            }

            if let Some(update) = &e.trip_update {
                s.trip_updates += 1;
                s.stop_time_updates += update.stop_time_update.len();
            }
        }

        s
    }

    /// Records what normalization kept and skipped.
    pub fn with_normalized(mut self, normalized: &Normalized) -> Self {
        let skipped = |kind: &str| normalized.skipped.get(kind).copied().unwrap_or(0);

        self.positions = normalized.positions.len();
        self.estimates = normalized.estimates.len();
        self.skipped_unknown_line = skipped("unknown_line");
        self.skipped_missing_trip = skipped("missing_trip");
        self.skipped_missing_stop = skipped("missing_stop");
        self.skipped_missing_time = skipped("missing_time");
        self.skipped_bad_start_date = skipped("bad_start_date");
        self
    }

    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        FeedStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    /// Set feed metadata (name and url)
    pub fn with_feed_info(mut self, feed_name: &str, feed_url: &str) -> Self {
        self.feed_name = Some(feed_name.to_string());
        self.feed_url = Some(feed_url.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_type.is_some()
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of stop time updates that became estimates.
    pub fn estimate_yield_pct(&self) -> f64 {
        Self::pct(self.estimates, self.stop_time_updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{FeedEntity, FeedHeader, TripUpdate, VehiclePosition, trip_update};
    use std::collections::BTreeMap;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(FeedStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(FeedStats::pct(50, 100), 50.0);
        assert_eq!(FeedStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_estimate_yield_pct() {
        let stats = FeedStats {
            stop_time_updates: 8,
            estimates: 6,
            ..Default::default()
        };
        assert_eq!(stats.estimate_yield_pct(), 75.0);
    }

    #[test]
    fn test_from_feed_empty() {
        let feed = FeedMessage {
            header: create_header(),
            entity: vec![],
        };
        let stats = FeedStats::from_feed(&feed);

        assert_eq!(stats.total_entities, 0);
        assert_eq!(stats.vehicles, 0);
        assert_eq!(stats.feed_timestamp.unwrap().timestamp(), 1234567890);
    }

    #[test]
    fn test_from_feed_counts_entities() {
        let feed = FeedMessage {
            header: create_header(),
            entity: vec![
                FeedEntity {
                    id: "v1".to_string(),
                    vehicle: Some(VehiclePosition::default()),
                    ..Default::default()
                },
                FeedEntity {
                    id: "t1".to_string(),
                    trip_update: Some(TripUpdate {
                        stop_time_update: vec![
                            trip_update::StopTimeUpdate::default(),
                            trip_update::StopTimeUpdate::default(),
                        ],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        };

        let stats = FeedStats::from_feed(&feed);

        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.vehicles, 1);
        assert_eq!(stats.trip_updates, 1);
        assert_eq!(stats.stop_time_updates, 2);
    }

    #[test]
    fn test_with_normalized_copies_skip_counts() {
        let normalized = Normalized {
            skipped: BTreeMap::from([("unknown_line", 3), ("missing_time", 1)]),
            ..Default::default()
        };
        let stats = FeedStats {
            stop_time_updates: 4,
            ..Default::default()
        }
        .with_normalized(&normalized);

        assert_eq!(stats.skipped_unknown_line, 3);
        assert_eq!(stats.skipped_missing_time, 1);
        assert_eq!(stats.skipped_missing_stop, 0);
        assert_eq!(stats.estimate_yield_pct(), 0.0);
    }

    #[test]
    fn test_from_error() {
        let stats = FeedStats::from_error("fetch_error", "timed out").with_feed_info("L", "http://x");
        assert!(stats.is_error());
        assert_eq!(stats.feed_name.as_deref(), Some("L"));
    }

    fn create_header() -> FeedHeader {
        FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(1234567890),
            incrementality: None,
            feed_version: None,
        }
    }
}
