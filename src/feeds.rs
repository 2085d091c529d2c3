//! The fixed catalog of upstream real-time endpoints.
//!
//! The agency publishes no unified feed: every line group has its own
//! endpoint, and each endpoint only ever reports the lines listed here.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::model::LineId;

const MTA_FEED_BASE: &str = "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2F";

/// One upstream GTFS-RT endpoint and the lines it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEndpoint {
    pub name: String,
    /// HTTP(S) URL, or a local file path holding a captured payload.
    pub url: String,
    pub lines: Vec<LineId>,
}

impl FeedEndpoint {
    fn mta(name: &str, path: &str, lines: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            url: format!("{MTA_FEED_BASE}{path}"),
            lines: lines.iter().map(|l| LineId::from(*l)).collect(),
        }
    }

    /// Returns `true` if `line` is one of this endpoint's known lines.
    pub fn serves(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l.as_str() == line)
    }
}

/// Ordered set of endpoints polled on every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCatalog {
    endpoints: Vec<FeedEndpoint>,
}

impl FeedCatalog {
    pub fn new(endpoints: Vec<FeedEndpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            bail!("feed catalog has no endpoints");
        }
        for endpoint in &endpoints {
            if endpoint.lines.is_empty() {
                bail!("feed endpoint '{}' lists no lines", endpoint.name);
            }
        }
        Ok(Self { endpoints })
    }

    /// The eight NYCT subway endpoints.
    pub fn mta_subway() -> Self {
        Self {
            endpoints: vec![
                FeedEndpoint::mta(
                    "1, 2, 3, 4, 5, 6, 7, S",
                    "gtfs",
                    &["1", "2", "3", "4", "5", "6", "6X", "7", "7X", "GS"],
                ),
                FeedEndpoint::mta("A, C, E, H", "gtfs-ace", &["A", "C", "E", "H", "FS"]),
                FeedEndpoint::mta("N, Q, R, W", "gtfs-nqrw", &["N", "Q", "R", "W"]),
                FeedEndpoint::mta("B, D, F, M", "gtfs-bdfm", &["B", "D", "F", "FX", "M"]),
                FeedEndpoint::mta("L", "gtfs-l", &["L"]),
                FeedEndpoint::mta("G", "gtfs-g", &["G"]),
                FeedEndpoint::mta("J, Z", "gtfs-jz", &["J", "Z"]),
                FeedEndpoint::mta("SIR", "gtfs-si", &["SI"]),
            ],
        }
    }

    /// Loads a catalog from a JSON file:
    ///
    /// ```json
    /// {
    ///   "endpoints": [
    ///     { "name": "L", "url": "https://.../nyct%2Fgtfs-l", "lines": ["L"] }
    ///   ]
    /// }
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading feed catalog {}", path.display()))?;
        let catalog: FeedCatalog = serde_json::from_str(&content)
            .with_context(|| format!("parsing feed catalog {}", path.display()))?;
        Self::new(catalog.endpoints)
    }

    pub fn endpoints(&self) -> &[FeedEndpoint] {
        &self.endpoints
    }

    /// Every line any endpoint may report.
    pub fn known_lines(&self) -> BTreeSet<LineId> {
        self.endpoints
            .iter()
            .flat_map(|e| e.lines.iter().cloned())
            .collect()
    }

    pub fn is_known(&self, line: &str) -> bool {
        self.endpoints.iter().any(|e| e.serves(line))
    }
}
