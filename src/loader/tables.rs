/// CSV parsers for the tabular inputs.
///
/// Columns are located by header name (case-insensitive, surrounding
/// whitespace ignored), so column order in the exports does not matter.
/// Blank cells, `NA`/`null`, and the `-9999` sentinel all read as absent.
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::Path;

use crate::adapters::dashboard::DashboardRecord;
use crate::adapters::maize::MaizeRecord;
use crate::adapters::soil::SoilSample;
use crate::adapters::weather::HourlyObservation;
use crate::counties::County;
use crate::error::LoadError;
use crate::geo::GeoPoint;
use crate::model::clean_value;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Column positions looked up from the header row.
struct Columns<'p> {
    path: &'p Path,
    by_name: BTreeMap<String, usize>,
}

impl<'p> Columns<'p> {
    fn new(path: &'p Path, headers: &csv::StringRecord) -> Self {
        Self {
            path,
            by_name: headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
                .collect(),
        }
    }

    fn required(&self, name: &str) -> Result<usize, LoadError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::MissingColumn {
                path: self.path.to_path_buf(),
                column: name.to_string(),
            })
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

fn reader(raw: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(raw.as_bytes())
}

fn csv_error(path: &Path, source: csv::Error) -> LoadError {
    LoadError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).unwrap_or("")
}

/// Parse a numeric cell. Blank and NA-like cells are `None`.
pub fn parse_number(raw: &str, path: &Path, row: usize) -> Result<Option<f64>, LoadError> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
    {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(|v| clean_value(Some(v)))
        .map_err(|_| LoadError::InvalidValue {
            path: path.to_path_buf(),
            row,
            msg: format!("Not a number: {trimmed}"),
        })
}

fn parse_timestamp(raw: &str, path: &Path, row: usize) -> Result<NaiveDateTime, LoadError> {
    let trimmed = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| LoadError::InvalidValue {
            path: path.to_path_buf(),
            row,
            msg: format!("Invalid timestamp: {trimmed}"),
        })
}

fn parse_county(raw: &str, path: &Path, row: usize) -> Result<County, LoadError> {
    raw.parse::<County>().map_err(|source| LoadError::UnknownCounty {
        path: path.to_path_buf(),
        row,
        source,
    })
}

fn parse_year(raw: &str, path: &Path, row: usize) -> Result<Option<i32>, LoadError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    // Spreadsheet exports sometimes render years as "2019.0"
    let numeric = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    numeric
        .parse::<i32>()
        .map(Some)
        .map_err(|_| LoadError::InvalidValue {
            path: path.to_path_buf(),
            row,
            msg: format!("Invalid year: {trimmed}"),
        })
}

/// `timestamp, temperature_c, precipitation_mm, humidity_pct, pressure_hpa`
pub fn parse_weather(path: &Path, raw: &str) -> Result<Vec<HourlyObservation>, LoadError> {
    let mut rdr = reader(raw);
    let columns = Columns::new(path, rdr.headers().map_err(|e| csv_error(path, e))?);
    let timestamp = columns.required("timestamp")?;
    let temperature = columns.required("temperature_c")?;
    let precipitation = columns.optional("precipitation_mm");
    let humidity = columns.optional("humidity_pct");
    let pressure = columns.optional("pressure_hpa");

    let mut observations = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let row = idx + 2;
        observations.push(HourlyObservation {
            timestamp: parse_timestamp(cell(&record, Some(timestamp)), path, row)?,
            temperature_c: parse_number(cell(&record, Some(temperature)), path, row)?,
            precipitation_mm: parse_number(cell(&record, precipitation), path, row)?,
            humidity_pct: parse_number(cell(&record, humidity), path, row)?,
            pressure_hpa: parse_number(cell(&record, pressure), path, row)?,
        });
    }
    Ok(observations)
}

/// `sample_id, latitude, longitude, ph_h2o, organic_carbon_pct, clay_pct`
///
/// Samples without coordinates cannot be attributed to a county and are an error.
pub fn parse_soil(path: &Path, raw: &str) -> Result<Vec<SoilSample>, LoadError> {
    let mut rdr = reader(raw);
    let columns = Columns::new(path, rdr.headers().map_err(|e| csv_error(path, e))?);
    let sample_id = columns.optional("sample_id");
    let latitude = columns.required("latitude")?;
    let longitude = columns.required("longitude")?;
    let ph = columns.required("ph_h2o")?;
    let carbon = columns.optional("organic_carbon_pct");
    let clay = columns.optional("clay_pct");

    let mut samples = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let row = idx + 2;
        let coordinate = |col: usize, name: &str| {
            parse_number(cell(&record, Some(col)), path, row)?.ok_or_else(|| {
                LoadError::InvalidValue {
                    path: path.to_path_buf(),
                    row,
                    msg: format!("Missing {name}"),
                }
            })
        };
        let id = cell(&record, sample_id);
        samples.push(SoilSample {
            sample_id: if id.is_empty() {
                format!("row-{row}")
            } else {
                id.to_string()
            },
            location: GeoPoint::new(coordinate(latitude, "latitude")?, coordinate(longitude, "longitude")?),
            ph_h2o: parse_number(cell(&record, Some(ph)), path, row)?,
            organic_carbon_pct: parse_number(cell(&record, carbon), path, row)?,
            clay_pct: parse_number(cell(&record, clay), path, row)?,
        });
    }
    Ok(samples)
}

/// `county, year, production_tonnes, area_ha`
pub fn parse_maize(path: &Path, raw: &str) -> Result<Vec<MaizeRecord>, LoadError> {
    let mut rdr = reader(raw);
    let columns = Columns::new(path, rdr.headers().map_err(|e| csv_error(path, e))?);
    let county = columns.required("county")?;
    let year = columns.required("year")?;
    let production = columns.required("production_tonnes")?;
    let area = columns.required("area_ha")?;

    let mut records = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let row = idx + 2;
        let Some(year) = parse_year(cell(&record, Some(year)), path, row)? else {
            return Err(LoadError::InvalidValue {
                path: path.to_path_buf(),
                row,
                msg: "Missing year".to_string(),
            });
        };
        records.push(MaizeRecord {
            county: parse_county(cell(&record, Some(county)), path, row)?,
            year,
            production_tonnes: parse_number(cell(&record, Some(production)), path, row)?,
            area_ha: parse_number(cell(&record, Some(area)), path, row)?,
        });
    }
    Ok(records)
}

/// `county, [year], irrigation_coverage_pct, water_access_pct`
pub fn parse_dashboard(path: &Path, raw: &str) -> Result<Vec<DashboardRecord>, LoadError> {
    let mut rdr = reader(raw);
    let columns = Columns::new(path, rdr.headers().map_err(|e| csv_error(path, e))?);
    let county = columns.required("county")?;
    let year = columns.optional("year");
    let coverage = columns.required("irrigation_coverage_pct")?;
    let access = columns.optional("water_access_pct");

    let mut records = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let row = idx + 2;
        records.push(DashboardRecord {
            county: parse_county(cell(&record, Some(county)), path, row)?,
            year: parse_year(cell(&record, year), path, row)?,
            irrigation_coverage_pct: parse_number(cell(&record, Some(coverage)), path, row)?,
            water_access_pct: parse_number(cell(&record, access), path, row)?,
        });
    }
    Ok(records)
}

/// `county, adjustment`
pub fn parse_adjustments(path: &Path, raw: &str) -> Result<BTreeMap<County, f64>, LoadError> {
    let mut rdr = reader(raw);
    let columns = Columns::new(path, rdr.headers().map_err(|e| csv_error(path, e))?);
    let county = columns.required("county")?;
    let adjustment = columns.required("adjustment")?;

    let mut values = BTreeMap::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let row = idx + 2;
        let Some(value) = parse_number(cell(&record, Some(adjustment)), path, row)? else {
            continue;
        };
        values.insert(parse_county(cell(&record, Some(county)), path, row)?, value);
    }
    Ok(values)
}
