/// Quality validator.
///
/// Reads the joined table, the derived features and the scores, and produces a
/// `QualityReport`. It never mutates any of them. A report containing a fatal
/// issue (a required field above the null-rate threshold) rejects the run.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config::Calibration;
use crate::counties::County;
use crate::features::{DerivedFeatures, DerivedField};
use crate::join::JoinedTable;
use crate::model::{
    CountyMonthKey, Field, FieldValue, MissingReason, ProvenanceTag, SourceId, StudyWindow,
    YearMonth,
};
use crate::reconcile::RecoveryEvent;
use crate::scoring::{ClampCounts, IndexKind, ScoreSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum QualityIssue {
    NullRateExceeded {
        field: Field,
        null_rate: f64,
        max_null_rate: f64,
        required: bool,
    },
    OutOfRangeValue {
        field: Field,
        count: usize,
        min: f64,
        max: f64,
    },
    HighRainfallUnderDrought {
        key: CountyMonthKey,
        rainfall_mm: f64,
        water_stress: f64,
    },
    StationSatelliteDisagreement {
        key: CountyMonthKey,
        station_mm: f64,
        satellite_mm: f64,
    },
    SuspectedPlaceholder {
        field: Field,
        months: usize,
    },
}

impl QualityIssue {
    /// Fatal issues reject the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QualityIssue::NullRateExceeded { required: true, .. })
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::NullRateExceeded {
                field,
                null_rate,
                max_null_rate,
                required,
            } => write!(
                f,
                "{}null rate of {field} is {:.1}% (max {:.1}%)",
                if *required { "required field: " } else { "" },
                null_rate * 100.0,
                max_null_rate * 100.0
            ),
            QualityIssue::OutOfRangeValue {
                field,
                count,
                min,
                max,
            } => write!(f, "{count} values of {field} outside [{min}, {max}]"),
            QualityIssue::HighRainfallUnderDrought {
                key,
                rainfall_mm,
                water_stress,
            } => write!(
                f,
                "{key}: rainfall {rainfall_mm:.1} mm with water stress {water_stress:.2}"
            ),
            QualityIssue::StationSatelliteDisagreement {
                key,
                station_mm,
                satellite_mm,
            } => write!(
                f,
                "{key}: station precipitation {station_mm:.1} mm vs satellite {satellite_mm:.1} mm"
            ),
            QualityIssue::SuspectedPlaceholder { field, months } => write!(
                f,
                "{field} identical across all counties in {months} months"
            ),
        }
    }
}

/// Share of missing values, bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessTier {
    Complete,
    Low,
    Medium,
    High,
    Critical,
}

impl CompletenessTier {
    pub fn from_missing_rate(rate: f64) -> Self {
        if rate <= 0.0 {
            CompletenessTier::Complete
        } else if rate <= 0.05 {
            CompletenessTier::Low
        } else if rate <= 0.10 {
            CompletenessTier::Medium
        } else if rate <= 0.20 {
            CompletenessTier::High
        } else {
            CompletenessTier::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldQuality {
    pub source: SourceId,
    pub unit: &'static str,
    pub null_count: usize,
    pub null_rate: f64,
    pub completeness: CompletenessTier,
    pub out_of_range_count: usize,
    pub inconsistency_count: usize,
    pub provenance: BTreeMap<ProvenanceTag, usize>,
    pub missing_reasons: BTreeMap<MissingReason, usize>,
    pub placeholder_months: Vec<YearMonth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceQuality {
    pub fields: Vec<Field>,
    pub null_rate: f64,
    pub out_of_range_count: usize,
    pub inconsistency_count: usize,
    pub recoveries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedQuality {
    pub missing_count: usize,
    pub missing_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreQuality {
    pub missing_count: usize,
    pub clamped: ClampCounts,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideApplied {
    pub key: CountyMonthKey,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencySummary {
    pub high_rainfall_under_drought: usize,
    pub station_satellite_disagreements: usize,
    pub overrides_applied: Vec<OverrideApplied>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub calibration_version: String,
    pub window: StudyWindow,
    pub rows: usize,
    pub overall_completeness_pct: f64,
    pub fields: BTreeMap<Field, FieldQuality>,
    pub sources: BTreeMap<SourceId, SourceQuality>,
    pub derived: BTreeMap<DerivedField, DerivedQuality>,
    pub scores: BTreeMap<IndexKind, ScoreQuality>,
    pub consistency: ConsistencySummary,
    pub recoveries: Vec<RecoveryEvent>,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn fatal_issues(&self) -> Vec<&QualityIssue> {
        self.issues.iter().filter(|i| i.is_fatal()).collect()
    }

    pub fn is_usable(&self) -> bool {
        self.issues.iter().all(|i| !i.is_fatal())
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Validate one run's artifacts.
#[instrument(skip_all, fields(rows = table.len()))]
pub fn validate(
    table: &JoinedTable,
    features: &[DerivedFeatures],
    scores: &ScoreSet,
    recoveries: &[RecoveryEvent],
    calibration: &Calibration,
) -> QualityReport {
    let thresholds = &calibration.quality;
    let rows = table.len();
    let mut issues = Vec::new();

    // Per-field null rate, range and provenance
    let mut fields: BTreeMap<Field, FieldQuality> = BTreeMap::new();
    for field in Field::ALL {
        let (min, max) = field.plausible_range();
        let mut quality = FieldQuality {
            source: field.source(),
            unit: field.unit(),
            null_count: 0,
            null_rate: 0.0,
            completeness: CompletenessTier::Complete,
            out_of_range_count: 0,
            inconsistency_count: 0,
            provenance: BTreeMap::new(),
            missing_reasons: BTreeMap::new(),
            placeholder_months: Vec::new(),
        };
        for record in &table.records {
            match record.get(field) {
                FieldValue::Present { value, provenance } => {
                    *quality.provenance.entry(provenance.tag).or_default() += 1;
                    if value < min || value > max {
                        quality.out_of_range_count += 1;
                    }
                }
                FieldValue::Missing(reason) => {
                    quality.null_count += 1;
                    *quality.missing_reasons.entry(reason).or_default() += 1;
                }
            }
        }
        quality.null_rate = rate(quality.null_count, rows);
        quality.completeness = CompletenessTier::from_missing_rate(quality.null_rate);

        let required = thresholds.required_fields.contains(&field);
        if quality.null_rate > thresholds.max_null_rate {
            issues.push(QualityIssue::NullRateExceeded {
                field,
                null_rate: quality.null_rate,
                max_null_rate: thresholds.max_null_rate,
                required,
            });
        }
        if quality.out_of_range_count > 0 {
            issues.push(QualityIssue::OutOfRangeValue {
                field,
                count: quality.out_of_range_count,
                min,
                max,
            });
        }
        fields.insert(field, quality);
    }

    // Dashboard placeholders: one value shared by every county in a month
    for field in Field::of_source(SourceId::Dashboard) {
        let months = placeholder_months(table, field);
        if !months.is_empty() {
            issues.push(QualityIssue::SuspectedPlaceholder {
                field,
                months: months.len(),
            });
        }
        if let Some(quality) = fields.get_mut(&field) {
            quality.placeholder_months = months;
        }
    }

    // Cross-field and cross-source consistency
    let mut consistency = ConsistencySummary::default();
    for (record, derived) in table.records.iter().zip(features) {
        let rainfall = record.value(Field::Rainfall);

        if let (Some(rainfall_mm), Ok(water_stress)) = (rainfall, derived.water_stress) {
            if rainfall_mm >= thresholds.high_rainfall_mm
                && water_stress >= thresholds.severe_drought_stress
            {
                match thresholds.override_for(&record.key) {
                    Some(accepted) => consistency.overrides_applied.push(OverrideApplied {
                        key: record.key,
                        reason: accepted.reason.clone(),
                    }),
                    None => {
                        consistency.high_rainfall_under_drought += 1;
                        bump_inconsistency(&mut fields, Field::Rainfall);
                        issues.push(QualityIssue::HighRainfallUnderDrought {
                            key: record.key,
                            rainfall_mm,
                            water_stress,
                        });
                    }
                }
            }
        }

        if let (Some(station_mm), Some(satellite_mm)) =
            (record.value(Field::StationPrecipitation), rainfall)
        {
            let diff = (station_mm - satellite_mm).abs();
            let larger = station_mm.max(satellite_mm);
            if diff > thresholds.station_satellite_abs_mm
                && diff > thresholds.station_satellite_rel * larger
            {
                consistency.station_satellite_disagreements += 1;
                bump_inconsistency(&mut fields, Field::Rainfall);
                bump_inconsistency(&mut fields, Field::StationPrecipitation);
                issues.push(QualityIssue::StationSatelliteDisagreement {
                    key: record.key,
                    station_mm,
                    satellite_mm,
                });
            }
        }
    }

    // Per-source roll-up
    let sources = SourceId::ALL
        .iter()
        .map(|source| {
            let source_fields: Vec<Field> = Field::of_source(*source).collect();
            let nulls: usize = source_fields.iter().map(|f| fields[f].null_count).sum();
            (
                *source,
                SourceQuality {
                    null_rate: rate(nulls, rows * source_fields.len()),
                    out_of_range_count: source_fields.iter().map(|f| fields[f].out_of_range_count).sum(),
                    inconsistency_count: source_fields
                        .iter()
                        .map(|f| fields[f].inconsistency_count)
                        .sum(),
                    recoveries: recoveries.iter().filter(|r| r.source == *source).count(),
                    fields: source_fields,
                },
            )
        })
        .collect();

    let derived = DerivedField::ALL
        .iter()
        .map(|field| {
            let missing_count = features.iter().filter(|f| f.get(*field).is_err()).count();
            (
                *field,
                DerivedQuality {
                    missing_count,
                    missing_rate: rate(missing_count, features.len()),
                },
            )
        })
        .collect();

    let score_quality = IndexKind::ALL
        .iter()
        .map(|kind| {
            let values: Vec<f64> = scores
                .scores
                .iter()
                .filter_map(|s| s.get(*kind).ok().map(|score| score.value))
                .collect();
            let quality = ScoreQuality {
                missing_count: scores.scores.len() - values.len(),
                clamped: scores.clamps.get(kind).copied().unwrap_or_default(),
                min: values.iter().copied().reduce(f64::min),
                max: values.iter().copied().reduce(f64::max),
                mean: (!values.is_empty())
                    .then(|| values.iter().sum::<f64>() / values.len() as f64),
            };
            (*kind, quality)
        })
        .collect();

    let total_cells = rows * Field::ALL.len();
    let total_nulls: usize = fields.values().map(|f| f.null_count).sum();
    let overall_completeness_pct = 100.0 * (1.0 - rate(total_nulls, total_cells));

    let report = QualityReport {
        calibration_version: calibration.version.clone(),
        window: table.window,
        rows,
        overall_completeness_pct,
        fields,
        sources,
        derived,
        scores: score_quality,
        consistency,
        recoveries: recoveries.to_vec(),
        issues,
    };

    for issue in report.issues.iter().filter(|i| i.is_fatal()) {
        warn!(%issue, "Fatal quality issue");
    }
    info!(
        completeness_pct = report.overall_completeness_pct,
        issues = report.issues.len(),
        fatal = report.fatal_issues().len(),
        "Quality validation finished"
    );
    report
}

fn bump_inconsistency(fields: &mut BTreeMap<Field, FieldQuality>, field: Field) {
    if let Some(quality) = fields.get_mut(&field) {
        quality.inconsistency_count += 1;
    }
}

/// Months in which every county reports the same value for `field`.
fn placeholder_months(table: &JoinedTable, field: Field) -> Vec<YearMonth> {
    let mut by_month: BTreeMap<YearMonth, Vec<f64>> = BTreeMap::new();
    for record in &table.records {
        if let Some(value) = record.value(field) {
            by_month.entry(record.key.year_month()).or_default().push(value);
        }
    }
    by_month
        .into_iter()
        .filter(|(_, values)| {
            values.len() == County::ALL.len()
                && values.windows(2).all(|w| (w[0] - w[1]).abs() < f64::EPSILON)
        })
        .map(|(ym, _)| ym)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterOutput;
    use crate::config::calibration::ConsistencyOverride;
    use crate::counties::GeoAdjustments;
    use crate::features::derive;
    use crate::join::join;
    use crate::model::{NormalizedRecord, Provenance, ReconciliationRule};
    use crate::scoring::score_all;

    fn measured(field: Field, value: f64) -> FieldValue {
        FieldValue::present(
            value,
            Provenance::new(field.source(), ProvenanceTag::Measured, ReconciliationRule::Direct),
        )
    }

    /// One-year table where every key carries `values`, except where `skip` says otherwise.
    fn table_with(
        values: &[(Field, f64)],
        skip: impl Fn(&CountyMonthKey, Field) -> bool,
    ) -> JoinedTable {
        let window = StudyWindow::new(2019, 1);
        let outputs: Vec<AdapterOutput> = SourceId::ALL
            .iter()
            .map(|source| {
                let mut output = AdapterOutput::new(*source);
                for key in window.keys() {
                    let mut record = NormalizedRecord::new(key, *source);
                    for (field, value) in values.iter().filter(|(f, _)| f.source() == *source) {
                        if !skip(&key, *field) {
                            record = record.with(*field, measured(*field, *value));
                        }
                    }
                    output.records.push(record);
                }
                output
            })
            .collect();
        join(&window, &outputs).unwrap()
    }

    fn run(table: &JoinedTable, calibration: &Calibration) -> QualityReport {
        let features: Vec<DerivedFeatures> = table
            .records
            .iter()
            .map(|r| derive(r, &calibration.features))
            .collect();
        let scores = score_all(&features, &GeoAdjustments::builtin(), &calibration.indices);
        validate(table, &features, &scores, &[], calibration)
    }

    const BASELINE: [(Field, f64); 3] = [
        (Field::Temperature, 22.0),
        (Field::Rainfall, 90.0),
        (Field::SoilPh, 6.4),
    ];

    #[test]
    fn test_clean_table_is_usable() {
        let table = table_with(&BASELINE, |_, _| false);
        let report = run(&table, &Calibration::default());

        assert!(report.is_usable());
        assert_eq!(report.rows, 240);
        assert_eq!(report.fields[&Field::Temperature].null_count, 0);
        assert_eq!(
            report.fields[&Field::Temperature].completeness,
            CompletenessTier::Complete
        );
        assert_eq!(report.fields[&Field::Humidity].completeness, CompletenessTier::Critical);
    }

    #[test]
    fn test_required_field_above_threshold_is_fatal() {
        // Temperature missing for 4 of 12 months everywhere: 33 % > 25 %
        let table = table_with(&BASELINE, |key, field| field == Field::Temperature && key.month <= 4);
        let report = run(&table, &Calibration::default());

        assert!(!report.is_usable());
        let fatal = report.fatal_issues();
        assert_eq!(fatal.len(), 1);
        assert!(matches!(
            fatal[0],
            QualityIssue::NullRateExceeded { field: Field::Temperature, required: true, .. }
        ));
    }

    #[test]
    fn test_out_of_range_is_reported_not_fatal() {
        let table = table_with(&[(Field::Temperature, 22.0), (Field::Rainfall, 90.0), (Field::SoilPh, 11.5)], |_, _| false);
        let report = run(&table, &Calibration::default());

        assert!(report.is_usable());
        assert_eq!(report.fields[&Field::SoilPh].out_of_range_count, 240);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, QualityIssue::OutOfRangeValue { field: Field::SoilPh, count: 240, .. })));
    }

    #[test]
    fn test_high_rainfall_drought_needs_override() {
        // 45 °C drives evapotranspiration far above 210 mm of rain
        let values = [
            (Field::Temperature, 45.0),
            (Field::Rainfall, 210.0),
            (Field::SoilPh, 6.4),
        ];
        let table = table_with(&values, |_, _| false);
        let report = run(&table, &Calibration::default());
        let flagged = report.consistency.high_rainfall_under_drought;
        assert!(flagged > 0);
        assert_eq!(report.fields[&Field::Rainfall].inconsistency_count, flagged);

        let first = report
            .issues
            .iter()
            .find_map(|i| match i {
                QualityIssue::HighRainfallUnderDrought { key, .. } => Some(*key),
                _ => None,
            })
            .unwrap();
        let mut calibration = Calibration::default();
        calibration.quality.overrides.push(ConsistencyOverride {
            county: first.county,
            year: first.year,
            month: first.month,
            reason: "localized storm".to_string(),
        });
        let report = run(&table, &calibration);
        assert_eq!(report.consistency.high_rainfall_under_drought, flagged - 1);
        assert_eq!(report.consistency.overrides_applied.len(), 1);
    }

    #[test]
    fn test_station_satellite_disagreement() {
        let values = [
            (Field::Temperature, 22.0),
            (Field::Rainfall, 150.0),
            (Field::StationPrecipitation, 20.0),
            (Field::SoilPh, 6.4),
        ];
        let table = table_with(&values, |key, _| key.county != County::Meru);
        let report = run(&table, &Calibration::default());
        assert_eq!(report.consistency.station_satellite_disagreements, 12);
        assert_eq!(report.fields[&Field::StationPrecipitation].inconsistency_count, 12);
    }

    #[test]
    fn test_identical_dashboard_values_are_placeholders() {
        let values = [
            (Field::Temperature, 22.0),
            (Field::Rainfall, 90.0),
            (Field::SoilPh, 6.4),
            (Field::IrrigationCoverage, 15.0),
        ];
        let table = table_with(&values, |_, _| false);
        let report = run(&table, &Calibration::default());
        assert_eq!(
            report.fields[&Field::IrrigationCoverage].placeholder_months.len(),
            12
        );
        assert!(report.issues.iter().any(|i| matches!(
            i,
            QualityIssue::SuspectedPlaceholder { field: Field::IrrigationCoverage, months: 12 }
        )));
    }

    #[test]
    fn test_completeness_tiers() {
        assert_eq!(CompletenessTier::from_missing_rate(0.0), CompletenessTier::Complete);
        assert_eq!(CompletenessTier::from_missing_rate(0.05), CompletenessTier::Low);
        assert_eq!(CompletenessTier::from_missing_rate(0.08), CompletenessTier::Medium);
        assert_eq!(CompletenessTier::from_missing_rate(0.15), CompletenessTier::High);
        assert_eq!(CompletenessTier::from_missing_rate(0.5), CompletenessTier::Critical);
    }
}
