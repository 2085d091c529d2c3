//! Flat-file output: appended poll statistics and overwritten datasets.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, info};

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends `record` as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, record: &impl Serialize) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes `rows` to `path`, replacing any previous content.
///
/// `header` must list the fields `T` serializes to. It is written as-is
/// when there are no rows, so an empty dataset is still a readable CSV.
pub fn write_records<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    if rows.is_empty() {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

/// The header line serde produces for `row`, for checking a declared
/// header against the type.
#[cfg(test)]
pub(crate) fn serialized_header<T: Serialize>(row: &T) -> String {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(vec![]);
    writer.serialize(row).unwrap();
    let bytes = writer.into_inner().unwrap();
    String::from_utf8(bytes).unwrap().lines().next().unwrap().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::FeedStats;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    const ROW_HEADER: &[&str] = &["stop_id", "mean"];

    #[derive(Serialize)]
    struct Row {
        stop_id: &'static str,
        mean: f64,
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let stats = FeedStats::default();
        print_json(&stats).unwrap();
    }

    #[test]
    fn test_append_record_creates_file() {
        let path = temp_path("subway_tracker_test_create.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        let stats = FeedStats::default();
        append_record(&path, &stats).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("subway_tracker_test_header.csv");
        let _ = fs::remove_file(&path);

        let stats = FeedStats::default();
        append_record(&path, &stats).unwrap();
        append_record(&path, &stats).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);

        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_records_overwrites() {
        let path = temp_path("subway_tracker_test_overwrite.csv");
        let _ = fs::remove_file(&path);

        let rows = [
            Row { stop_id: "A02S", mean: 120.0 },
            Row { stop_id: "A03S", mean: -30.5 },
        ];
        write_records(&path, ROW_HEADER, &rows).unwrap();
        write_records(&path, ROW_HEADER, &rows[..1]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "stop_id,mean\nA02S,120.0\n");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_records_empty_keeps_header() {
        let path = temp_path("subway_tracker_test_empty_dataset.csv");
        let _ = fs::remove_file(&path);

        write_records::<Row>(&path, ROW_HEADER, &[]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "stop_id,mean\n");
        assert_eq!(
            serialized_header(&Row { stop_id: "A02S", mean: 0.0 }),
            ROW_HEADER.join(",")
        );

        fs::remove_file(&path).unwrap();
    }
}
