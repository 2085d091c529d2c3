use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::model::AGENCY_TZ;

/// A GTFS `HH:MM:SS` time of day. Hours run past 23 for trips that finish
/// after midnight of their service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtfsTime(u32);

impl GtfsTime {
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        let [h, m, s] = parts.as_slice() else {
            bail!("expected HH:MM:SS, got '{raw}'");
        };
        let h: u32 = h.parse().with_context(|| format!("bad hour in '{raw}'"))?;
        let m: u32 = m.parse().with_context(|| format!("bad minute in '{raw}'"))?;
        let s: u32 = s.parse().with_context(|| format!("bad second in '{raw}'"))?;
        if m >= 60 || s >= 60 {
            bail!("minute or second out of range in '{raw}'");
        }
        let seconds = h
            .checked_mul(3600)
            .and_then(|hs| hs.checked_add(m * 60 + s))
            .with_context(|| format!("hour out of range in '{raw}'"))?;
        Ok(Self(seconds))
    }

    pub fn seconds(&self) -> u32 {
        self.0
    }

    /// The instant this time denotes on `service_date`. GTFS measures times
    /// from noon minus twelve hours, which differs from midnight on the two
    /// daylight-saving transition days.
    pub fn on_service_date(&self, service_date: NaiveDate) -> Option<DateTime<Utc>> {
        let noon = service_date.and_hms_opt(12, 0, 0)?;
        let noon = AGENCY_TZ.from_local_datetime(&noon).single()?;
        let instant = noon - Duration::hours(12) + Duration::seconds(i64::from(self.0));
        Some(instant.with_timezone(&Utc))
    }
}

impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

impl Serialize for GtfsTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regular_time() {
        let t = GtfsTime::parse("08:15:30").unwrap();
        assert_eq!(t.seconds(), 8 * 3600 + 15 * 60 + 30);
        assert_eq!(t.to_string(), "08:15:30");
    }

    #[test]
    fn test_parse_after_midnight() {
        let t = GtfsTime::parse("25:01:00").unwrap();
        assert_eq!(t.seconds(), 25 * 3600 + 60);
        assert_eq!(t.to_string(), "25:01:00");
    }

    #[test]
    fn test_parse_single_digit_hour() {
        assert_eq!(GtfsTime::parse(" 5:00:00").unwrap().seconds(), 5 * 3600);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(GtfsTime::parse("").is_err());
        assert!(GtfsTime::parse("08:15").is_err());
        assert!(GtfsTime::parse("08:61:00").is_err());
        assert!(GtfsTime::parse("aa:00:00").is_err());
    }

    #[test]
    fn test_parse_rejects_overflowing_hours() {
        assert!(GtfsTime::parse("4000000:00:00").is_err());
        assert!(GtfsTime::parse("1193046:28:16").is_err());
        assert_eq!(GtfsTime::parse("1193046:28:15").unwrap().seconds(), u32::MAX);
    }

    #[test]
    fn test_on_service_date_standard_time() {
        // EST is UTC-5
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let at = GtfsTime::parse("08:00:00").unwrap().on_service_date(date).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-01-15T13:00:00+00:00");
    }

    #[test]
    fn test_on_service_date_rolls_into_next_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let at = GtfsTime::parse("24:30:00").unwrap().on_service_date(date).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-01-16T05:30:00+00:00");
    }

    #[test]
    fn test_on_service_date_daylight_time() {
        // EDT is UTC-4
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let at = GtfsTime::parse("08:00:00").unwrap().on_service_date(date).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-07-01T12:00:00+00:00");
    }
}
