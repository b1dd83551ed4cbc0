/// Weather adapter: hourly station observations → monthly county values.
///
/// Temperature, humidity and pressure are monthly means of the hourly
/// readings. Station precipitation is the monthly sum. Heat-stress days count
/// calendar days whose hourly maximum reaches the configured threshold.
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

use crate::adapters::AdapterOutput;
use crate::config::calibration::{FeatureThresholds, ReconciliationSettings};
use crate::counties::County;
use crate::model::{
    Aggregation, CountyMonthKey, Field, FieldValue, MissingReason, NormalizedRecord, Provenance,
    ProvenanceTag, ReconciliationRule, SourceId, SourceSchema, StudyWindow,
};
use crate::reconcile::bucket_by_month;

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyObservation {
    pub timestamp: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_hpa: Option<f64>,
}

impl HourlyObservation {
    fn reading(&self, field: Field) -> Option<f64> {
        match field {
            Field::Temperature | Field::HeatStressDays => self.temperature_c,
            Field::Humidity => self.humidity_pct,
            Field::Pressure => self.pressure_hpa,
            Field::StationPrecipitation => self.precipitation_mm,
            _ => None,
        }
    }
}

/// Normalize every county's hourly series. Counties without a series get
/// `NotReported` for every weather field in every month.
#[instrument(skip_all, fields(counties = observations.len()))]
pub fn normalize(
    observations: &BTreeMap<County, Vec<HourlyObservation>>,
    window: &StudyWindow,
    features: &FeatureThresholds,
    settings: &ReconciliationSettings,
) -> AdapterOutput {
    let schema = SourceSchema::for_source(SourceId::Weather);
    let mut output = AdapterOutput::new(SourceId::Weather);
    let empty = Vec::new();

    for county in County::ALL {
        let series = observations.get(&county).unwrap_or(&empty);
        let buckets = bucket_by_month(series, window, |o| o.timestamp);

        for year_month in window.year_months() {
            let key = CountyMonthKey::new(county, year_month);
            let hours = buckets.get(&year_month).map(Vec::as_slice).unwrap_or(&[]);
            let mut record = NormalizedRecord::new(key, SourceId::Weather);

            for spec in &schema.fields {
                let value = if hours.is_empty() {
                    FieldValue::Missing(MissingReason::NotReported)
                } else {
                    monthly_value(
                        hours,
                        spec.field,
                        features.heat_stress_day_threshold_c,
                        settings.min_days_observed,
                    )
                };
                if let FieldValue::Missing(MissingReason::InsufficientObservations) = value {
                    debug!(
                        county = %county,
                        year = key.year,
                        month = key.month,
                        field = %spec.field,
                        "Too few observed days for a monthly value"
                    );
                }
                record = record.with(spec.field, value);
            }
            output.records.push(record);
        }
    }

    output
}

/// Collapse one month of hourly readings into the field's monthly value.
pub fn monthly_value(
    hours: &[&HourlyObservation],
    field: Field,
    heat_threshold_c: f64,
    min_days_observed: u32,
) -> FieldValue {
    let readings: Vec<(NaiveDate, f64)> = hours
        .iter()
        .filter_map(|o| o.reading(field).map(|v| (o.timestamp.date(), v)))
        .collect();

    let days_observed = readings.iter().map(|(d, _)| *d).collect::<BTreeSet<_>>().len();
    if readings.is_empty() {
        return FieldValue::Missing(MissingReason::NotReported);
    }
    if (days_observed as u32) < min_days_observed {
        return FieldValue::Missing(MissingReason::InsufficientObservations);
    }

    if field == Field::HeatStressDays {
        let mut daily_max: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (day, value) in &readings {
            daily_max
                .entry(*day)
                .and_modify(|max| *max = max.max(*value))
                .or_insert(*value);
        }
        let hot_days = daily_max.values().filter(|max| **max >= heat_threshold_c).count();
        return FieldValue::present(
            hot_days as f64,
            Provenance::new(
                SourceId::Weather,
                ProvenanceTag::Aggregated,
                ReconciliationRule::DailyMaxThresholdCount,
            ),
        );
    }

    let sum: f64 = readings.iter().map(|(_, v)| v).sum();
    match field.aggregation() {
        Some(Aggregation::Sum) => FieldValue::present(
            sum,
            Provenance::new(SourceId::Weather, ProvenanceTag::Aggregated, ReconciliationRule::HourlySum),
        ),
        Some(Aggregation::Mean) => FieldValue::present(
            sum / readings.len() as f64,
            Provenance::new(SourceId::Weather, ProvenanceTag::Aggregated, ReconciliationRule::HourlyMean),
        ),
        None => FieldValue::Missing(MissingReason::NotReported),
    }
}
