/// Dashboard adapter: county (or county-year) aggregates replicated per month.
///
/// A record without a year applies to every year of the window. A year-specific
/// record takes precedence over the yearless one for its year.
use std::collections::BTreeMap;
use tracing::instrument;

use crate::adapters::AdapterOutput;
use crate::counties::County;
use crate::model::{
    clean_value, Field, FieldValue, MissingReason, Provenance, ProvenanceTag, ReconciliationRule,
    SourceId, StudyWindow, YearMonth,
};
use crate::reconcile::repeat_time_invariant;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRecord {
    pub county: County,
    pub year: Option<i32>,
    pub irrigation_coverage_pct: Option<f64>,
    pub water_access_pct: Option<f64>,
}

impl DashboardRecord {
    fn values(&self) -> BTreeMap<Field, FieldValue> {
        let provenance = Provenance::new(
            SourceId::Dashboard,
            ProvenanceTag::Aggregated,
            ReconciliationRule::TimeInvariantRepeat,
        );
        [
            (Field::IrrigationCoverage, self.irrigation_coverage_pct),
            (Field::WaterAccess, self.water_access_pct),
        ]
        .into_iter()
        .map(|(field, raw)| {
            let value = match clean_value(raw) {
                Some(v) => FieldValue::present(v, provenance),
                None => FieldValue::Missing(MissingReason::NotReported),
            };
            (field, value)
        })
        .collect()
    }
}

/// Emit one record per county-month covered by the dashboard.
///
/// Two records competing for the same county-year are both emitted; the join
/// rejects them as a duplicate key rather than silently picking one.
#[instrument(skip_all, fields(records = records.len()))]
pub fn normalize(records: &[DashboardRecord], window: &StudyWindow) -> AdapterOutput {
    let mut yearly: BTreeMap<(County, i32), Vec<&DashboardRecord>> = BTreeMap::new();
    let mut yearless: BTreeMap<County, Vec<&DashboardRecord>> = BTreeMap::new();
    for record in records {
        match record.year {
            Some(year) => yearly.entry((record.county, year)).or_default().push(record),
            None => yearless.entry(record.county).or_default().push(record),
        }
    }

    let mut output = AdapterOutput::new(SourceId::Dashboard);
    for county in County::ALL {
        for year in window.start_year..=window.end_year() {
            let chosen = yearly
                .get(&(county, year))
                .or_else(|| yearless.get(&county));
            let Some(chosen) = chosen else {
                continue;
            };
            let months: Vec<YearMonth> = (1..=12).map(|month| YearMonth { year, month }).collect();
            for record in chosen {
                output
                    .records
                    .extend(repeat_time_invariant(county, &months, SourceId::Dashboard, &record.values()));
            }
        }
    }
    output
}
