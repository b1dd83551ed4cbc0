/// One pipeline run: adapters → join → derive → score → validate.
///
/// All raw inputs are loaded before this runs (the join barrier). Every stage
/// after the join iterates keys in sorted order. A run either returns the full
/// table with a report free of fatal issues, or an error and no table.
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

use crate::adapters::{self, AdapterOutput};
use crate::adapters::dashboard::DashboardRecord;
use crate::adapters::maize::MaizeRecord;
use crate::adapters::soil::SoilSample;
use crate::adapters::weather::HourlyObservation;
use crate::config::Calibration;
use crate::counties::{County, GeoAdjustments};
use crate::error::PipelineError;
use crate::features::{self, DerivedFeatures};
use crate::geo::CountyBoundaries;
use crate::join::{self, JoinedRecord};
use crate::model::{CountyMonthKey, StudyWindow, YearMonth};
use crate::quality::{self, QualityReport};
use crate::raster::AsciiGrid;
use crate::reconcile::RecoveryEvent;
use crate::scoring::{self, CompositeScores};

/// Everything one run reads, already parsed.
#[derive(Debug, Clone)]
pub struct RawInputs {
    pub weather: BTreeMap<County, Vec<HourlyObservation>>,
    pub soil: Vec<SoilSample>,
    pub rainfall: BTreeMap<YearMonth, AsciiGrid>,
    pub maize: Vec<MaizeRecord>,
    pub dashboard: Vec<DashboardRecord>,
    pub boundaries: CountyBoundaries,
    pub adjustments: GeoAdjustments,
}

/// One row of the output table.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyMonthRow {
    pub joined: JoinedRecord,
    pub features: DerivedFeatures,
    pub scores: CompositeScores,
}

impl CountyMonthRow {
    pub fn key(&self) -> CountyMonthKey {
        self.joined.key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub window: StudyWindow,
    pub calibration_version: String,
    pub rows: Vec<CountyMonthRow>,
    pub report: QualityReport,
}

/// Run every adapter over its raw dataset.
pub fn normalize_sources(
    inputs: &RawInputs,
    calibration: &Calibration,
    window: &StudyWindow,
) -> Vec<AdapterOutput> {
    vec![
        adapters::weather::normalize(
            &inputs.weather,
            window,
            &calibration.features,
            &calibration.reconciliation,
        ),
        adapters::soil::normalize(
            &inputs.soil,
            &inputs.boundaries,
            window,
            &calibration.reconciliation,
        ),
        adapters::rainfall::normalize(&inputs.rainfall, &inputs.boundaries, window),
        adapters::maize::normalize(&inputs.maize, window),
        adapters::dashboard::normalize(&inputs.dashboard, window),
    ]
}

#[instrument(skip_all, fields(start_year = window.start_year, years = window.years, version = %calibration.version))]
pub fn run(
    inputs: &RawInputs,
    calibration: &Calibration,
    window: &StudyWindow,
) -> Result<PipelineRun, PipelineError> {
    calibration.validate()?;

    let outputs = normalize_sources(inputs, calibration, window);
    let recoveries: Vec<RecoveryEvent> = outputs
        .iter()
        .flat_map(|o| o.recoveries.iter().cloned())
        .collect();
    info!(recoveries = recoveries.len(), "Sources normalized");

    let table = join::join(window, &outputs)?;

    let derived: Vec<DerivedFeatures> = table
        .records
        .iter()
        .map(|record| features::derive(record, &calibration.features))
        .collect();

    let scores = scoring::score_all(&derived, &inputs.adjustments, &calibration.indices);

    let report = quality::validate(&table, &derived, &scores, &recoveries, calibration);
    if !report.is_usable() {
        let issues: Vec<_> = report.fatal_issues().into_iter().cloned().collect();
        error!(fatal = issues.len(), "Run rejected by quality validation");
        return Err(PipelineError::Rejected { issues });
    }

    let rows: Vec<CountyMonthRow> = table
        .records
        .into_iter()
        .zip(derived)
        .zip(scores.scores)
        .map(|((joined, features), scores)| CountyMonthRow {
            joined,
            features,
            scores,
        })
        .collect();

    info!(rows = rows.len(), "Pipeline run complete");
    Ok(PipelineRun {
        window: *window,
        calibration_version: calibration.version.clone(),
        rows,
        report,
    })
}
