/// Run artifacts: the county-month table (CSV), the quality report (JSON) and
/// the per-county summary (JSON).
///
/// Output is deterministic: rows are already in key order, floats are written
/// with fixed precision, and nothing time-dependent is included. Files are
/// written to a temporary name and renamed into place, so a reader never sees
/// a partial table.
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::{MissingInput, OutputError};
use crate::features::DerivedField;
use crate::model::{Field, FieldValue};
use crate::pipeline::{CountyMonthRow, PipelineRun};
use crate::scoring::{IndexKind, Score};
use crate::summary::{self, RiskLevel};
use crate::utils::normalize_zero;

pub fn format_number(value: f64) -> String {
    format!("{:.4}", normalize_zero(value))
}

fn format_feature(value: Result<f64, MissingInput>) -> String {
    value.map(format_number).unwrap_or_default()
}

fn format_provenance(value: &FieldValue) -> String {
    match value {
        FieldValue::Present { provenance, .. } => format!("{}:{}", provenance.tag, provenance.rule),
        FieldValue::Missing(reason) => format!("missing:{reason}"),
    }
}

pub fn table_header() -> Vec<String> {
    let mut header: Vec<String> = ["county", "year", "month", "climate_zone"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for field in Field::ALL {
        header.push(field.column().to_string());
        header.push(format!("{}_provenance", field.column()));
    }
    for field in DerivedField::ALL {
        header.push(field.column().to_string());
    }
    for kind in IndexKind::ALL {
        header.push(kind.column().to_string());
        header.push(format!("{}_clamped", kind.column()));
    }
    header.push("risk_level".to_string());
    header.push("scoring_version".to_string());
    header
}

pub fn table_record(row: &CountyMonthRow, scoring_version: &str) -> Vec<String> {
    let key = row.key();
    let mut record = vec![
        key.county.to_string(),
        key.year.to_string(),
        key.month.to_string(),
        key.county.climate_zone().to_string(),
    ];
    for field in Field::ALL {
        let value = row.joined.get(field);
        record.push(value.value().map(format_number).unwrap_or_default());
        record.push(format_provenance(&value));
    }
    for field in DerivedField::ALL {
        record.push(format_feature(row.features.get(field)));
    }
    for kind in IndexKind::ALL {
        match row.scores.get(kind) {
            Ok(Score { value, clamped }) => {
                record.push(format_number(value));
                record.push(match clamped {
                    Some(c) => format!("{c:?}").to_lowercase(),
                    None => String::new(),
                });
            }
            Err(_) => {
                record.push(String::new());
                record.push(String::new());
            }
        }
    }
    record.push(
        row.scores
            .agricultural_risk
            .map(|s| RiskLevel::from_score(s.value).to_string())
            .unwrap_or_default(),
    );
    record.push(scoring_version.to_string());
    record
}

pub fn write_table<W: io::Write>(writer: W, run: &PipelineRun) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(table_header())?;
    for row in &run.rows {
        writer.write_record(table_record(row, &run.calibration_version))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_json<W: io::Write, T: Serialize>(writer: W, value: &T) -> Result<(), OutputError> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

async fn write_atomically(path: &Path, bytes: Vec<u8>) -> Result<(), OutputError> {
    let io_error = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tmp: PathBuf = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(io_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error)?;
    Ok(())
}

/// Write the table, the quality report and the summary under `config.output_dir`.
pub async fn write_artifacts(config: &Config, run: &PipelineRun) -> Result<(), OutputError> {
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|source| OutputError::Io {
            path: config.output_dir.clone(),
            source,
        })?;

    let mut table = Vec::new();
    write_table(&mut table, run)?;
    let mut report = Vec::new();
    write_json(&mut report, &run.report)?;
    let mut summary = Vec::new();
    write_json(&mut summary, &summary::summarize(&run.rows))?;

    write_atomically(&config.table_path(), table).await?;
    write_atomically(&config.report_path(), report).await?;
    write_atomically(&config.summary_path(), summary).await?;

    info!(
        table = %config.table_path().display(),
        report = %config.report_path().display(),
        rows = run.rows.len(),
        "Artifacts written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting_is_stable() {
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
        assert_eq!(format_number(-0.0), "0.0000");
        assert_eq!(format_number(1200.0), "1200.0000");
    }

    #[test]
    fn test_header_has_one_column_per_value() {
        let header = table_header();
        assert_eq!(header.len(), 4 + 2 * Field::ALL.len() + DerivedField::ALL.len() + 2 * 3 + 2);
        assert_eq!(header[0], "county");
        assert!(header.contains(&"soil_ph_provenance".to_string()));
        assert!(header.contains(&"water_scarcity_score".to_string()));
    }
}
