/// Rainfall adapter: one satellite raster per month → county polygon means.
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use crate::adapters::AdapterOutput;
use crate::counties::County;
use crate::error::AdapterError;
use crate::geo::CountyBoundaries;
use crate::model::{
    CountyMonthKey, Field, FieldValue, MissingReason, NormalizedRecord, Provenance,
    ProvenanceTag, ReconciliationRule, SourceId, StudyWindow, YearMonth,
};
use crate::raster::AsciiGrid;
use crate::reconcile::{RecoveryEvent, RecoveryKind};

/// Mean of the valid cells whose centres fall inside each county polygon.
/// Counties without any such cell are absent from the result.
pub fn polygon_means(grid: &AsciiGrid, boundaries: &CountyBoundaries) -> BTreeMap<County, f64> {
    let mut sums: BTreeMap<County, (f64, usize)> = BTreeMap::new();
    for (centre, value) in grid.valid_cells() {
        if let Some(county) = boundaries.containing(&centre) {
            let entry = sums.entry(county).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(county, (sum, count))| (county, sum / count as f64))
        .collect()
}

/// Normalize the monthly rasters over the study window.
///
/// A window month without a raster is reported as `MissingRasterFile` and
/// every county's `Rainfall` for that month is marked missing.
#[instrument(skip_all, fields(rasters = rasters.len()))]
pub fn normalize(
    rasters: &BTreeMap<YearMonth, AsciiGrid>,
    boundaries: &CountyBoundaries,
    window: &StudyWindow,
) -> AdapterOutput {
    let mut output = AdapterOutput::new(SourceId::Rainfall);

    for year_month in window.year_months() {
        let Some(grid) = rasters.get(&year_month) else {
            let condition = AdapterError::MissingRasterFile { year_month };
            warn!(%year_month, error = %condition, "Rainfall marked missing for all counties");
            output.recoveries.push(RecoveryEvent {
                source: SourceId::Rainfall,
                county: None,
                year_month: Some(year_month),
                kind: RecoveryKind::MissingRasterFile,
            });
            for county in County::ALL {
                output.records.push(
                    NormalizedRecord::new(CountyMonthKey::new(county, year_month), SourceId::Rainfall)
                        .with(Field::Rainfall, FieldValue::Missing(MissingReason::MissingRasterFile)),
                );
            }
            continue;
        };

        let means = polygon_means(grid, boundaries);
        for county in County::ALL {
            let key = CountyMonthKey::new(county, year_month);
            let value = match means.get(&county) {
                Some(mean) => FieldValue::present(
                    *mean,
                    Provenance::new(
                        SourceId::Rainfall,
                        ProvenanceTag::Aggregated,
                        ReconciliationRule::PolygonCellMean,
                    ),
                ),
                None => centroid_fallback(grid, boundaries, county, year_month, &mut output.recoveries),
            };
            output
                .records
                .push(NormalizedRecord::new(key, SourceId::Rainfall).with(Field::Rainfall, value));
        }
    }

    let extra = rasters.keys().filter(|ym| !window.contains(**ym)).count();
    if extra > 0 {
        debug!(extra, "Ignored rasters outside the study window");
    }
    output
}

fn centroid_fallback(
    grid: &AsciiGrid,
    boundaries: &CountyBoundaries,
    county: County,
    year_month: YearMonth,
    recoveries: &mut Vec<RecoveryEvent>,
) -> FieldValue {
    let centroid_value = boundaries
        .get(county)
        .and_then(|b| grid.value_at(&b.centroid));

    let (value, kind) = match centroid_value {
        Some(v) => (
            FieldValue::present(
                v,
                Provenance::new(
                    SourceId::Rainfall,
                    ProvenanceTag::Aggregated,
                    ReconciliationRule::CentroidCell,
                ),
            ),
            RecoveryKind::CentroidCell,
        ),
        None => (
            FieldValue::Missing(MissingReason::NoRasterCoverage),
            RecoveryKind::NoRasterCoverage,
        ),
    };
    debug!(county = %county, %year_month, ?kind, "No cell centre inside county polygon");
    recoveries.push(RecoveryEvent {
        source: SourceId::Rainfall,
        county: Some(county),
        year_month: Some(year_month),
        kind,
    });
    value
}
