use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

/// `stop_id` to `stop_name`, from `stops.txt`.
#[derive(Debug, Clone, Default)]
pub struct StopNames(HashMap<String, String>);

impl StopNames {
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut names = HashMap::new();
        for rec in csv::Reader::from_reader(reader).deserialize() {
            let rec: Record = rec?;
            names.insert(rec.stop_id, rec.stop_name);
        }
        Ok(Self(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up `stop_id`, then its parent station (the id without the
    /// `N`/`S` platform suffix).
    pub fn lookup(&self, stop_id: &str) -> Option<&str> {
        if let Some(name) = self.0.get(stop_id) {
            return Some(name);
        }
        let parent = stop_id.strip_suffix(['N', 'S'])?;
        self.0.get(parent).map(String::as_str)
    }

    /// The stop's name, or the id itself when unknown.
    pub fn name_or_id(&self, stop_id: &str) -> String {
        self.lookup(stop_id).unwrap_or(stop_id).to_string()
    }
}

#[derive(Deserialize)]
struct Record {
    stop_id: String,
    stop_name: String,
}
