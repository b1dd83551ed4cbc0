/// Shared domain model: the county-month key, the study window, the field
/// catalogue, and per-field provenance.
///
/// This module contains no I/O. Every other stage imports its types from here.
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::counties::County;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Calendar month of a given year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Returns `None` unless `month` is in `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn days_in_month(&self) -> u32 {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1);
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        match (first, next) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 30,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// The universal join key. Ordered by county, then year, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CountyMonthKey {
    pub county: County,
    pub year: i32,
    pub month: u32,
}

impl CountyMonthKey {
    pub fn new(county: County, year_month: YearMonth) -> Self {
        Self {
            county,
            year: year_month.year,
            month: year_month.month,
        }
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }
}

impl fmt::Display for CountyMonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{:02}", self.county, self.year, self.month)
    }
}

/// Contiguous run of whole calendar years analysed by one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyWindow {
    pub start_year: i32,
    pub years: u32,
}

impl StudyWindow {
    pub fn new(start_year: i32, years: u32) -> Self {
        Self { start_year, years }
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + self.years as i32 - 1
    }

    pub fn contains_year(&self, year: i32) -> bool {
        year >= self.start_year && year <= self.end_year()
    }

    pub fn contains(&self, year_month: YearMonth) -> bool {
        self.contains_year(year_month.year)
    }

    pub fn year_months(&self) -> Vec<YearMonth> {
        (self.start_year..=self.end_year())
            .flat_map(|year| (1..=12).map(move |month| YearMonth { year, month }))
            .collect()
    }

    /// Full county × month cross-product, in key order.
    pub fn keys(&self) -> Vec<CountyMonthKey> {
        let months = self.year_months();
        County::ALL
            .iter()
            .flat_map(|county| months.iter().map(|ym| CountyMonthKey::new(*county, *ym)))
            .collect()
    }

    pub fn key_count(&self) -> usize {
        County::ALL.len() * self.years as usize * 12
    }
}

impl Default for StudyWindow {
    fn default() -> Self {
        Self::new(2019, 5)
    }
}

// ---------------------------------------------------------------------------
// Sources and fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Weather,
    Soil,
    Rainfall,
    Maize,
    Dashboard,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::Weather,
        SourceId::Soil,
        SourceId::Rainfall,
        SourceId::Maize,
        SourceId::Dashboard,
    ];
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Weather => write!(f, "weather"),
            SourceId::Soil => write!(f, "soil"),
            SourceId::Rainfall => write!(f, "rainfall"),
            SourceId::Maize => write!(f, "maize"),
            SourceId::Dashboard => write!(f, "dashboard"),
        }
    }
}

/// How hourly observations collapse into a monthly value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Sum,
}

/// Every joined field, with its owning source, unit and plausible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Temperature,
    Humidity,
    Pressure,
    StationPrecipitation,
    HeatStressDays,
    SoilPh,
    SoilOrganicCarbon,
    SoilClay,
    Rainfall,
    MaizeProduction,
    MaizeArea,
    IrrigationCoverage,
    WaterAccess,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Temperature,
        Field::Humidity,
        Field::Pressure,
        Field::StationPrecipitation,
        Field::HeatStressDays,
        Field::SoilPh,
        Field::SoilOrganicCarbon,
        Field::SoilClay,
        Field::Rainfall,
        Field::MaizeProduction,
        Field::MaizeArea,
        Field::IrrigationCoverage,
        Field::WaterAccess,
    ];

    pub fn source(&self) -> SourceId {
        match self {
            Field::Temperature
            | Field::Humidity
            | Field::Pressure
            | Field::StationPrecipitation
            | Field::HeatStressDays => SourceId::Weather,
            Field::SoilPh | Field::SoilOrganicCarbon | Field::SoilClay => SourceId::Soil,
            Field::Rainfall => SourceId::Rainfall,
            Field::MaizeProduction | Field::MaizeArea => SourceId::Maize,
            Field::IrrigationCoverage | Field::WaterAccess => SourceId::Dashboard,
        }
    }

    /// Output column name.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Temperature => "temperature_c",
            Field::Humidity => "humidity_pct",
            Field::Pressure => "pressure_hpa",
            Field::StationPrecipitation => "station_precipitation_mm",
            Field::HeatStressDays => "heat_stress_days",
            Field::SoilPh => "soil_ph",
            Field::SoilOrganicCarbon => "soil_organic_carbon_pct",
            Field::SoilClay => "soil_clay_pct",
            Field::Rainfall => "rainfall_mm",
            Field::MaizeProduction => "maize_production_tonnes",
            Field::MaizeArea => "maize_area_ha",
            Field::IrrigationCoverage => "irrigation_coverage_pct",
            Field::WaterAccess => "water_access_pct",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Field::Temperature => "degC",
            Field::Humidity | Field::SoilOrganicCarbon | Field::SoilClay => "%",
            Field::IrrigationCoverage | Field::WaterAccess => "%",
            Field::Pressure => "hPa",
            Field::StationPrecipitation | Field::Rainfall => "mm/month",
            Field::HeatStressDays => "days",
            Field::SoilPh => "pH",
            Field::MaizeProduction => "t/month",
            Field::MaizeArea => "ha/month",
        }
    }

    /// Inclusive plausible range used by the quality validator.
    pub fn plausible_range(&self) -> (f64, f64) {
        match self {
            Field::Temperature => (-10.0, 50.0),
            Field::Humidity => (0.0, 100.0),
            Field::Pressure => (500.0, 1100.0),
            Field::StationPrecipitation | Field::Rainfall => (0.0, 1500.0),
            Field::HeatStressDays => (0.0, 31.0),
            Field::SoilPh => (3.0, 10.0),
            Field::SoilOrganicCarbon => (0.1, 10.0),
            Field::SoilClay => (0.0, 100.0),
            Field::MaizeProduction | Field::MaizeArea => (0.0, 1.0e7),
            Field::IrrigationCoverage | Field::WaterAccess => (0.0, 100.0),
        }
    }

    /// Fixed hourly → monthly rule. `None` for fields that are not hourly.
    pub fn aggregation(&self) -> Option<Aggregation> {
        match self {
            Field::Temperature | Field::Humidity | Field::Pressure => Some(Aggregation::Mean),
            Field::StationPrecipitation | Field::HeatStressDays => Some(Aggregation::Sum),
            _ => None,
        }
    }

    pub fn of_source(source: SourceId) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| f.source() == source)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Declared schema of one source: which fields it feeds, with units and ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSchema {
    pub source: SourceId,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    pub unit: &'static str,
    pub range: (f64, f64),
}

impl SourceSchema {
    pub fn for_source(source: SourceId) -> Self {
        Self {
            source,
            fields: Field::of_source(source)
                .map(|field| FieldSpec {
                    field,
                    unit: field.unit(),
                    range: field.plausible_range(),
                })
                .collect(),
        }
    }

    pub fn declares(&self, field: Field) -> bool {
        self.fields.iter().any(|spec| spec.field == field)
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceTag {
    Measured,
    Aggregated,
    FallbackBorrowed,
    UniformlyDistributed,
}

impl fmt::Display for ProvenanceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvenanceTag::Measured => write!(f, "measured"),
            ProvenanceTag::Aggregated => write!(f, "aggregated"),
            ProvenanceTag::FallbackBorrowed => write!(f, "fallback_borrowed"),
            ProvenanceTag::UniformlyDistributed => write!(f, "uniformly_distributed"),
        }
    }
}

/// The reconciliation rule that produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationRule {
    Direct,
    HourlyMean,
    HourlySum,
    DailyMaxThresholdCount,
    SampleMean,
    TimeInvariantRepeat,
    BorrowedFrom(County),
    PolygonCellMean,
    CentroidCell,
    UniformAnnualSplit,
}

impl fmt::Display for ReconciliationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationRule::Direct => write!(f, "direct"),
            ReconciliationRule::HourlyMean => write!(f, "hourly_mean"),
            ReconciliationRule::HourlySum => write!(f, "hourly_sum"),
            ReconciliationRule::DailyMaxThresholdCount => write!(f, "daily_max_threshold_count"),
            ReconciliationRule::SampleMean => write!(f, "sample_mean"),
            ReconciliationRule::TimeInvariantRepeat => write!(f, "time_invariant_repeat"),
            ReconciliationRule::BorrowedFrom(county) => write!(f, "borrowed_from:{}", county.slug()),
            ReconciliationRule::PolygonCellMean => write!(f, "polygon_cell_mean"),
            ReconciliationRule::CentroidCell => write!(f, "centroid_cell"),
            ReconciliationRule::UniformAnnualSplit => write!(f, "uniform_annual_split"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub source: SourceId,
    pub tag: ProvenanceTag,
    pub rule: ReconciliationRule,
}

impl Provenance {
    pub fn new(source: SourceId, tag: ProvenanceTag, rule: ReconciliationRule) -> Self {
        Self { source, tag, rule }
    }
}

/// Why a field has no value for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    NotReported,
    MissingRasterFile,
    InsufficientSamples,
    NoRasterCoverage,
    InsufficientObservations,
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::NotReported => write!(f, "not_reported"),
            MissingReason::MissingRasterFile => write!(f, "missing_raster_file"),
            MissingReason::InsufficientSamples => write!(f, "insufficient_samples"),
            MissingReason::NoRasterCoverage => write!(f, "no_raster_coverage"),
            MissingReason::InsufficientObservations => write!(f, "insufficient_observations"),
        }
    }
}

/// A field value as seen by the join: present with provenance, or explicitly missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Present { value: f64, provenance: Provenance },
    Missing(MissingReason),
}

impl FieldValue {
    pub fn present(value: f64, provenance: Provenance) -> Self {
        FieldValue::Present { value, provenance }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            FieldValue::Present { value, .. } => Some(*value),
            FieldValue::Missing(_) => None,
        }
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        match self {
            FieldValue::Present { provenance, .. } => Some(provenance),
            FieldValue::Missing(_) => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing(_))
    }
}

/// One source's contribution to one county-month.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub key: CountyMonthKey,
    pub source: SourceId,
    pub fields: BTreeMap<Field, FieldValue>,
}

impl NormalizedRecord {
    pub fn new(key: CountyMonthKey, source: SourceId) -> Self {
        Self {
            key,
            source,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: Field, value: FieldValue) -> Self {
        self.fields.insert(field, value);
        self
    }
}

/// Sentinel used by several upstream tables for "no data".
pub const NODATA_SENTINEL: f64 = -9999.0;

/// Treat the `-9999` sentinel and non-finite values as absent.
pub fn clean_value(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && (*v - NODATA_SENTINEL).abs() > f64::EPSILON)
}
