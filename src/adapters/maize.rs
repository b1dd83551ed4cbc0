/// Maize adapter: annual county production and harvested area → monthly
/// values by uniform split.
///
/// The split is a seasonally unweighted approximation. Monthly maize values
/// (and the yield derived from them, which is constant within a year) must not
/// be read as independently measured.
use tracing::{debug, instrument};

use crate::adapters::AdapterOutput;
use crate::counties::County;
use crate::model::{clean_value, Field, SourceId, StudyWindow};
use crate::reconcile::split_annual_uniformly;

#[derive(Debug, Clone, PartialEq)]
pub struct MaizeRecord {
    pub county: County,
    pub year: i32,
    pub production_tonnes: Option<f64>,
    pub area_ha: Option<f64>,
}

#[instrument(skip_all, fields(records = records.len()))]
pub fn normalize(records: &[MaizeRecord], window: &StudyWindow) -> AdapterOutput {
    let mut output = AdapterOutput::new(SourceId::Maize);

    let mut outside = 0usize;
    for record in records {
        if !window.contains_year(record.year) {
            outside += 1;
            continue;
        }
        output.records.extend(split_annual_uniformly(
            record.county,
            record.year,
            SourceId::Maize,
            &[
                (Field::MaizeProduction, clean_value(record.production_tonnes)),
                (Field::MaizeArea, clean_value(record.area_ha)),
            ],
        ));
    }
    if outside > 0 {
        debug!(outside, "Dropped maize records outside the study window");
    }

    output
}
