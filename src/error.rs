use std::fmt;
use std::path::PathBuf;

use crate::config::CalibrationError;
use crate::counties::{AdjustmentError, County, UnknownCounty};
use crate::geo::{BoundaryError, BoundaryParseError};
use crate::model::{CountyMonthKey, Field, SourceId, YearMonth};
use crate::quality::QualityIssue;
use crate::raster::GridParseError;

/// Errors raised while reading raw inputs from disk.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Missing column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid value at {path} row {row}: {msg}")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        msg: String,
    },

    #[error("Failed to open workbook {path}: {msg}")]
    Workbook { path: PathBuf, msg: String },

    #[error("Invalid raster {path}: {source}")]
    Grid {
        path: PathBuf,
        #[source]
        source: GridParseError,
    },

    #[error("Invalid boundaries {path}: {source}")]
    Boundaries {
        path: PathBuf,
        #[source]
        source: BoundaryParseError,
    },

    #[error(transparent)]
    BoundarySet(#[from] BoundaryError),

    #[error(transparent)]
    Adjustments(#[from] AdjustmentError),

    #[error("Unknown county in {path} row {row}: {source}")]
    UnknownCounty {
        path: PathBuf,
        row: usize,
        #[source]
        source: UnknownCounty,
    },

    #[error("Second weather file for {county}: {path}")]
    DuplicateWeatherFile { county: County, path: PathBuf },

    #[error("Duplicate raster for {year_month}: {path}")]
    DuplicateRaster { year_month: YearMonth, path: PathBuf },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Recoverable adapter conditions. Each one is handled locally (fallback or
/// explicit missing marker) and recorded; none aborts a run on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("No soil samples fall within {county}")]
    InsufficientSamples { county: County },

    #[error("No rainfall raster for {year_month}")]
    MissingRasterFile { year_month: YearMonth },
}

/// A derived feature or composite score could not be computed for one key.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Missing input {field} for {key}")]
pub struct MissingInput {
    pub key: CountyMonthKey,
    pub field: Field,
}

/// An input a run cannot start without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredInput {
    Source(SourceId),
    Boundaries,
}

impl fmt::Display for RequiredInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredInput::Source(source_id) => write!(f, "{source_id}"),
            RequiredInput::Boundaries => f.write_str("county boundaries"),
        }
    }
}

/// Run-level failure. A run that returns one of these produced no table.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Required {input} input not found: {path}")]
    MissingSourceFile { input: RequiredInput, path: PathBuf },

    #[error("Failed to load input: {0}")]
    Load(#[from] LoadError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Source {source_id} reported {field} for {key} more than once")]
    DuplicateKey {
        source_id: SourceId,
        key: CountyMonthKey,
        field: Field,
    },

    #[error("Run rejected by quality validation: {}", summarize_issues(.issues))]
    Rejected { issues: Vec<QualityIssue> },
}

fn summarize_issues(issues: &[QualityIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while writing run artifacts.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
