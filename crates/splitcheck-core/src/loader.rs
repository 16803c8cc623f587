//! CSV loader for observation logs.
//!
//! Columns are located by header name, so extra columns and any column order
//! are accepted. Every value is validated: an unknown label, an unparsable
//! flag or timestamp, or a missing column aborts the load with a
//! [`AnalysisError::DataValidation`] naming the offending data row.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::observation::{Condition, Observation, Page};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Header names for each observation field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub subject_id: String,
    pub condition: String,
    pub page_shown: String,
    pub converted: String,
    pub timestamp: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            subject_id: "user_id".to_string(),
            condition: "group".to_string(),
            page_shown: "landing_page".to_string(),
            converted: "converted".to_string(),
            timestamp: "timestamp".to_string(),
        }
    }
}

/// Accepted values for the two categorical columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub control: String,
    pub treatment: String,
    pub old_page: String,
    pub new_page: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            control: "control".to_string(),
            treatment: "treatment".to_string(),
            old_page: "old_page".to_string(),
            new_page: "new_page".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub columns: ColumnNames,
    pub labels: Labels,
    pub delimiter: char,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            labels: Labels::default(),
            delimiter: ',',
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(AnalysisError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        let l = &self.labels;
        if l.control == l.treatment {
            return Err(AnalysisError::Config(
                "control and treatment labels must differ".to_string(),
            ));
        }
        if l.old_page == l.new_page {
            return Err(AnalysisError::Config(
                "old and new page labels must differ".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Column resolution
// ---------------------------------------------------------------------------

struct ColumnIndex {
    subject_id: usize,
    condition: usize,
    page_shown: usize,
    converted: usize,
    timestamp: usize,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord, names: &ColumnNames) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| AnalysisError::validation(format!("missing column `{name}`")))
        };
        Ok(Self {
            subject_id: find(&names.subject_id)?,
            condition: find(&names.condition)?,
            page_shown: find(&names.page_shown)?,
            converted: find(&names.converted)?,
            timestamp: find(&names.timestamp)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<&'r str> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| AnalysisError::at_row(row, format!("missing value for `{column}`")))
}

fn parse_condition(value: &str, labels: &Labels, row: usize) -> Result<Condition> {
    if value == labels.control {
        Ok(Condition::Control)
    } else if value == labels.treatment {
        Ok(Condition::Treatment)
    } else {
        Err(AnalysisError::at_row(
            row,
            format!(
                "unexpected condition `{value}` (expected `{}` or `{}`)",
                labels.control, labels.treatment
            ),
        ))
    }
}

fn parse_page(value: &str, labels: &Labels, row: usize) -> Result<Page> {
    if value == labels.old_page {
        Ok(Page::Old)
    } else if value == labels.new_page {
        Ok(Page::New)
    } else {
        Err(AnalysisError::at_row(
            row,
            format!(
                "unexpected page `{value}` (expected `{}` or `{}`)",
                labels.old_page, labels.new_page
            ),
        ))
    }
}

fn parse_converted(value: &str, row: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(AnalysisError::at_row(
            row,
            format!("conversion flag `{value}` is not 0/1/true/false"),
        )),
    }
}

/// Parse RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.ffffff]` taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read and validate every observation from a CSV stream with a header row.
pub fn read_observations<R: Read>(reader: R, cfg: &LoaderConfig) -> Result<Vec<Observation>> {
    cfg.validate()?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(cfg.delimiter as u8)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let idx = ColumnIndex::resolve(&headers, &cfg.columns)?;
    let cols = &cfg.columns;

    let mut observations = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| AnalysisError::at_row(row, e.to_string()))?;

        let subject_id = field(&record, idx.subject_id, &cols.subject_id, row)?;
        if subject_id.is_empty() {
            return Err(AnalysisError::at_row(row, "empty subject id"));
        }
        let condition = parse_condition(
            field(&record, idx.condition, &cols.condition, row)?,
            &cfg.labels,
            row,
        )?;
        let page_shown = parse_page(
            field(&record, idx.page_shown, &cols.page_shown, row)?,
            &cfg.labels,
            row,
        )?;
        let converted = parse_converted(field(&record, idx.converted, &cols.converted, row)?, row)?;
        let raw_ts = field(&record, idx.timestamp, &cols.timestamp, row)?;
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            AnalysisError::at_row(row, format!("unparsable timestamp `{raw_ts}`"))
        })?;

        observations.push(Observation {
            subject_id: subject_id.to_string(),
            condition,
            page_shown,
            converted,
            timestamp,
        });
    }

    log::info!("loaded {} observations", observations.len());
    Ok(observations)
}

/// Open `path` and read it with [`read_observations`].
pub fn load_observations(path: &Path, cfg: &LoaderConfig) -> Result<Vec<Observation>> {
    log::debug!("reading observations from {}", path.display());
    let file = File::open(path)?;
    read_observations(BufReader::new(file), cfg)
}
