use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

/// Which services run on which dates, from `calendar.txt` and the optional
/// `calendar_dates.txt` exceptions.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    services: Vec<Service>,
    added: BTreeMap<NaiveDate, BTreeSet<String>>,
    removed: BTreeMap<NaiveDate, BTreeSet<String>>,
}

#[derive(Debug, Clone)]
struct Service {
    service_id: String,
    /// Indexed by days from Monday.
    days: [bool; 7],
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl Calendar {
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut services = Vec::new();
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: CalendarRecord = rec?;
            services.push(Service {
                days: [
                    rec.monday == 1,
                    rec.tuesday == 1,
                    rec.wednesday == 1,
                    rec.thursday == 1,
                    rec.friday == 1,
                    rec.saturday == 1,
                    rec.sunday == 1,
                ],
                start_date: parse_date(&rec.start_date)?,
                end_date: parse_date(&rec.end_date)?,
                service_id: rec.service_id,
            });
        }
        Ok(Self {
            services,
            ..Default::default()
        })
    }

    /// Applies `calendar_dates.txt`: exception type 1 adds a service on a
    /// date, type 2 removes it.
    pub fn load_exceptions<R: Read>(&mut self, reader: R) -> Result<()> {
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: ExceptionRecord = rec?;
            let date = parse_date(&rec.date)?;
            let target = match rec.exception_type {
                1 => &mut self.added,
                2 => &mut self.removed,
                _ => continue,
            };
            target.entry(date).or_default().insert(rec.service_id);
        }
        Ok(())
    }

    /// Services active on `date`.
    pub fn active_services(&self, date: NaiveDate) -> BTreeSet<String> {
        let weekday = date.weekday().num_days_from_monday() as usize;
        let mut active: BTreeSet<String> = self
            .services
            .iter()
            .filter(|s| s.start_date <= date && date <= s.end_date && s.days[weekday])
            .map(|s| s.service_id.clone())
            .collect();

        if let Some(added) = self.added.get(&date) {
            active.extend(added.iter().cloned());
        }
        if let Some(removed) = self.removed.get(&date) {
            active.retain(|s| !removed.contains(s));
        }
        active
    }
}

/// Parses a GTFS `YYYYMMDD` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").with_context(|| format!("bad GTFS date '{raw}'"))
}

#[derive(Deserialize)]
struct CalendarRecord {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Deserialize)]
struct ExceptionRecord {
    service_id: String,
    date: String,
    exception_type: u8,
}
