//! Sensor Dataset Adapter
//!
//! Parses the location-aware GIS leakage dataset (CSV) into immutable
//! [`SensorRecord`]s. The whole file is materialized up front — analysis
//! never touches I/O — and record indices are stable for the life of the
//! process, serving as the time surrogate.
//!
//! Expected header columns (order-independent):
//! `Location_Code, Zone, Block, Pipe, Latitude, Longitude, Flow_Rate,
//! Pressure, Temperature, RPM, Operational_Hours, Vibration, Leakage_Flag`

use crate::types::{GeoPoint, SensorRecord};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Error type for dataset loading
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset {path} has no header row")]
    MissingHeader { path: PathBuf },
    #[error("dataset {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error("dataset {path} contains no parseable records")]
    Empty { path: PathBuf },
}

const REQUIRED_COLUMNS: &[&str] = &[
    "Location_Code",
    "Zone",
    "Block",
    "Pipe",
    "Latitude",
    "Longitude",
    "Flow_Rate",
    "Pressure",
    "Temperature",
    "RPM",
    "Operational_Hours",
    "Vibration",
    "Leakage_Flag",
];

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Check for escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Column-name → index mapping built from the header row
struct ColumnMap {
    indices: HashMap<String, usize>,
}

impl ColumnMap {
    fn from_header(header: &str, path: &Path) -> Result<Self, DatasetError> {
        let indices: HashMap<String, usize> = csv_split(header)
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        for column in REQUIRED_COLUMNS {
            if !indices.contains_key(*column) {
                return Err(DatasetError::MissingColumn {
                    path: path.to_path_buf(),
                    column: (*column).to_string(),
                });
            }
        }

        Ok(Self { indices })
    }

    fn text<'a>(&self, fields: &'a [String], column: &str) -> Option<&'a str> {
        self.indices
            .get(column)
            .and_then(|&i| fields.get(i))
            .map(|s| s.trim())
    }

    fn number(&self, fields: &[String], column: &str) -> Option<f64> {
        self.text(fields, column).and_then(|s| s.parse().ok())
    }
}

/// Fully materialized, randomly indexable sensor record sequence
#[derive(Debug)]
pub struct Dataset {
    records: Vec<SensorRecord>,
}

impl Dataset {
    /// Load a dataset CSV, skipping malformed rows with a warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();

        let header = match lines.next() {
            Some(Ok(line)) => line,
            _ => {
                return Err(DatasetError::MissingHeader {
                    path: path.to_path_buf(),
                })
            }
        };
        let columns = ColumnMap::from_header(&header, path)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line_no, line) in lines.enumerate() {
            let Ok(line) = line else {
                skipped += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(&columns, &line) {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    // Header is line 1, so data line N is file line N+2
                    warn!(line = line_no + 2, "Skipping malformed dataset row");
                }
            }
        }

        if records.is_empty() {
            return Err(DatasetError::Empty {
                path: path.to_path_buf(),
            });
        }

        info!(
            path = %path.display(),
            records = records.len(),
            skipped,
            "Dataset loaded"
        );

        Ok(Self { records })
    }

    /// Build a dataset from in-memory records (tests, simulation)
    pub fn from_records(records: Vec<SensorRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SensorRecord> {
        self.records.get(index)
    }

    /// Clamp an index into the valid range. The engine favors returning a
    /// best-effort verdict for the last record over failing.
    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.records.len().saturating_sub(1))
    }

    pub fn records(&self) -> &[SensorRecord] {
        &self.records
    }
}

fn parse_record(columns: &ColumnMap, line: &str) -> Option<SensorRecord> {
    let fields = csv_split(line);

    Some(SensorRecord {
        segment_id: columns.text(&fields, "Location_Code")?.to_string(),
        zone: columns.text(&fields, "Zone")?.to_string(),
        block: columns.text(&fields, "Block")?.to_string(),
        pipe: columns.text(&fields, "Pipe")?.to_string(),
        location: GeoPoint {
            lat: columns.number(&fields, "Latitude")?,
            lon: columns.number(&fields, "Longitude")?,
        },
        flow_rate: columns.number(&fields, "Flow_Rate")?,
        pressure: columns.number(&fields, "Pressure")?,
        temperature: columns.number(&fields, "Temperature")?,
        rpm: columns.number(&fields, "RPM")?,
        operational_hours: columns.number(&fields, "Operational_Hours")?,
        vibration: columns.number(&fields, "Vibration")?,
        leak_flag: columns.number(&fields, "Leakage_Flag")? != 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Location_Code,Zone,Block,Pipe,Latitude,Longitude,Flow_Rate,Pressure,Temperature,RPM,Operational_Hours,Vibration,Leakage_Flag";

    fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_parses_rows_in_order() {
        let file = write_csv(&[
            "Zone_1_Block_1_Pipe_1,Zone_1,Block_1,Pipe_1,3.1,101.6,50.5,65.2,25.0,1450,1200,0.4,0",
            "Zone_1_Block_1_Pipe_2,Zone_1,Block_1,Pipe_2,3.2,101.7,71.0,52.1,25.1,1455,1210,0.5,1",
        ]);

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = dataset.get(0).unwrap();
        assert_eq!(first.segment_id, "Zone_1_Block_1_Pipe_1");
        assert_eq!(first.flow_rate, 50.5);
        assert!(!first.leak_flag);

        let second = dataset.get(1).unwrap();
        assert!(second.leak_flag);
    }

    #[test]
    fn test_quoted_fields_with_commas() {
        let file = write_csv(&[
            "\"Zone_1_Block_1_Pipe_1\",\"Zone 1, North\",Block_1,Pipe_1,3.1,101.6,50.5,65.2,25.0,1450,1200,0.4,0",
        ]);

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.get(0).unwrap().zone, "Zone 1, North");
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let file = write_csv(&[
            "Zone_1_Block_1_Pipe_1,Zone_1,Block_1,Pipe_1,3.1,101.6,50.5,65.2,25.0,1450,1200,0.4,0",
            "Zone_1_Block_1_Pipe_2,Zone_1,Block_1,Pipe_2,not_a_number,101.7,71.0,52.1,25.1,1455,1210,0.5,1",
        ]);

        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Location_Code,Zone,Flow_Rate").unwrap();
        writeln!(file, "x,y,1.0").unwrap();

        let err = Dataset::load(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn { .. }));
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let file = write_csv(&[]);
        let err = Dataset::load(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::Empty { .. }));
    }

    #[test]
    fn test_clamp_index() {
        let file = write_csv(&[
            "Zone_1_Block_1_Pipe_1,Zone_1,Block_1,Pipe_1,3.1,101.6,50.5,65.2,25.0,1450,1200,0.4,0",
        ]);
        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.clamp_index(0), 0);
        assert_eq!(dataset.clamp_index(9999), 0);
    }
}
