/// Soil adapter: point-sampled profiles → time-invariant county means.
use std::collections::BTreeMap;
use tracing::{info, instrument};

use crate::adapters::AdapterOutput;
use crate::config::calibration::ReconciliationSettings;
use crate::counties::County;
use crate::error::AdapterError;
use crate::geo::{CountyBoundaries, GeoPoint};
use crate::model::{
    Field, Provenance, ProvenanceTag, ReconciliationRule, SourceId, SourceSchema, StudyWindow,
};
use crate::reconcile::{self, Located, RecoveryEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct SoilSample {
    pub sample_id: String,
    pub location: GeoPoint,
    pub ph_h2o: Option<f64>,
    pub organic_carbon_pct: Option<f64>,
    pub clay_pct: Option<f64>,
}

impl SoilSample {
    fn reading(&self, field: Field) -> Option<f64> {
        match field {
            Field::SoilPh => self.ph_h2o,
            Field::SoilOrganicCarbon => self.organic_carbon_pct,
            Field::SoilClay => self.clay_pct,
            _ => None,
        }
    }
}

impl Located for SoilSample {
    fn id(&self) -> &str {
        &self.sample_id
    }

    fn location(&self) -> GeoPoint {
        self.location
    }
}

/// Per-county sample means, before any fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilAggregation {
    pub means: BTreeMap<County, Result<BTreeMap<Field, f64>, AdapterError>>,
    pub recoveries: Vec<RecoveryEvent>,
}

/// Arithmetic mean of the samples attributed to each county.
///
/// A county with no attributed samples yields `InsufficientSamples`. A field
/// that every attributed sample leaves blank is simply absent from the
/// county's map.
pub fn aggregate(
    samples: &[SoilSample],
    boundaries: &CountyBoundaries,
    settings: &ReconciliationSettings,
) -> SoilAggregation {
    let schema = SourceSchema::for_source(SourceId::Soil);
    let (assigned, recoveries) = reconcile::assign_to_counties(
        samples,
        boundaries,
        settings.snap_tolerance_km,
        SourceId::Soil,
    );

    let means = County::ALL
        .iter()
        .map(|county| {
            let result = match assigned.get(county) {
                Some(samples) if !samples.is_empty() => Ok(schema
                    .fields
                    .iter()
                    .filter_map(|spec| {
                        let values: Vec<f64> =
                            samples.iter().filter_map(|s| s.reading(spec.field)).collect();
                        (!values.is_empty())
                            .then(|| (spec.field, values.iter().sum::<f64>() / values.len() as f64))
                    })
                    .collect()),
                _ => Err(AdapterError::InsufficientSamples { county: *county }),
            };
            (*county, result)
        })
        .collect();

    SoilAggregation { means, recoveries }
}

/// Aggregate, borrow for deficient counties, and repeat across the window.
#[instrument(skip_all, fields(samples = samples.len()))]
pub fn normalize(
    samples: &[SoilSample],
    boundaries: &CountyBoundaries,
    window: &StudyWindow,
    settings: &ReconciliationSettings,
) -> AdapterOutput {
    let aggregation = aggregate(samples, boundaries, settings);
    let fields: Vec<Field> = Field::of_source(SourceId::Soil).collect();
    let own = Provenance::new(
        SourceId::Soil,
        ProvenanceTag::Aggregated,
        ReconciliationRule::SampleMean,
    );
    let (filled, borrowed) =
        reconcile::borrow_from_nearest(&aggregation.means, &fields, boundaries, SourceId::Soil, own);

    let mut output = AdapterOutput::new(SourceId::Soil);
    output.recoveries = aggregation.recoveries;
    output.recoveries.extend(borrowed);

    let months = window.year_months();
    for (county, values) in &filled {
        output
            .records
            .extend(reconcile::repeat_time_invariant(*county, &months, SourceId::Soil, values));
    }

    info!(
        counties_with_samples = aggregation.means.values().filter(|r| r.is_ok()).count(),
        recoveries = output.recoveries.len(),
        "Soil profiles aggregated"
    );
    output
}
