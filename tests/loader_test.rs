// Loading inputs from disk and writing run artifacts
mod common;

use county_water_risk::config::Calibration;
use county_water_risk::counties::County;
use county_water_risk::error::{LoadError, PipelineError, RequiredInput};
use county_water_risk::loader;
use county_water_risk::model::{SourceId, StudyWindow, YearMonth};
use county_water_risk::output;
use county_water_risk::pipeline;
use tempfile::TempDir;

fn window() -> StudyWindow {
    StudyWindow::new(2020, 1)
}

fn fixture() -> (TempDir, county_water_risk::config::Config) {
    let dir = TempDir::new().unwrap();
    common::write_data_dir(dir.path(), &common::synthetic_inputs(&window()));
    let config = common::config_for(dir.path(), &window());
    (dir, config)
}

#[tokio::test]
async fn test_load_run_and_write_artifacts() {
    let (_dir, config) = fixture();

    let inputs = loader::load_inputs(&config).await.unwrap();
    assert_eq!(inputs.weather.len(), 20);
    assert_eq!(inputs.rainfall.len(), 12);
    assert_eq!(inputs.soil.len(), 60);
    assert_eq!(inputs.boundaries.iter().count(), 20);

    let run = pipeline::run(&inputs, &Calibration::default(), &config.study_window()).unwrap();
    assert_eq!(run.rows.len(), 240);

    output::write_artifacts(&config, &run).await.unwrap();

    let table = std::fs::read_to_string(config.table_path()).unwrap();
    assert_eq!(table.lines().count(), 241);
    assert!(table.starts_with("county,year,month,climate_zone,"));
    assert!(table.lines().nth(1).unwrap().starts_with("Baringo,2020,1,"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config.report_path()).unwrap()).unwrap();
    assert_eq!(report["rows"], 240);
    assert_eq!(report["calibration_version"], "2024.1");

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config.summary_path()).unwrap()).unwrap();
    assert_eq!(summary.as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_loaded_values_match_synthetic_inputs() {
    let (_dir, config) = fixture();
    let expected = common::synthetic_inputs(&window());

    let inputs = loader::load_inputs(&config).await.unwrap();
    assert_eq!(
        inputs.weather[&County::HomaBay].len(),
        expected.weather[&County::HomaBay].len()
    );
    let march = YearMonth::new(2020, 3).unwrap();
    assert_eq!(inputs.rainfall[&march], expected.rainfall[&march]);
    assert_eq!(inputs.maize.len(), 20);
    assert_eq!(inputs.dashboard.len(), 20);
}

#[tokio::test]
async fn test_missing_soil_file_is_reported() {
    let (_dir, config) = fixture();
    std::fs::remove_file(&config.soil_path).unwrap();

    let err = loader::load_inputs(&config).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingSourceFile {
            input: RequiredInput::Source(SourceId::Soil),
            ..
        }
    ));
}

#[tokio::test]
async fn test_missing_boundaries_file_is_reported() {
    let (_dir, config) = fixture();
    std::fs::remove_file(&config.boundaries_path).unwrap();

    let err = loader::load_inputs(&config).await.unwrap_err();
    match err {
        PipelineError::MissingSourceFile { input, path } => {
            assert_eq!(input, RequiredInput::Boundaries);
            assert_eq!(path, config.boundaries_path);
        }
        other => panic!("Expected missing boundaries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_raster_month_is_rejected() {
    let (_dir, config) = fixture();
    std::fs::copy(
        config.raster_dir.join("chirps_2020_05.asc"),
        config.raster_dir.join("rainfall-202005.asc"),
    )
    .unwrap();

    let err = loader::discover_rasters(&config.raster_dir).await.unwrap_err();
    assert!(matches!(err, LoadError::DuplicateRaster { year_month, .. } if year_month == YearMonth::new(2020, 5).unwrap()));
}

#[tokio::test]
async fn test_unrelated_files_are_skipped() {
    let (_dir, config) = fixture();
    std::fs::write(config.weather_dir.join("README.txt"), "notes").unwrap();
    std::fs::write(config.raster_dir.join("legend.asc"), "ncols 1").unwrap();

    let weather = loader::discover_weather_files(&config.weather_dir).await.unwrap();
    assert_eq!(weather.len(), 20);
    let rasters = loader::discover_rasters(&config.raster_dir).await.unwrap();
    assert_eq!(rasters.len(), 12);
}

#[tokio::test]
async fn test_unknown_county_in_maize_table() {
    let (_dir, config) = fixture();
    std::fs::write(
        &config.maize_path,
        "county,year,production_tonnes,area_ha\nAtlantis,2020,100,10\n",
    )
    .unwrap();

    let err = loader::load_maize(&config.maize_path, 0).await.unwrap_err();
    assert!(matches!(err, LoadError::UnknownCounty { row: 2, .. }));
}

#[tokio::test]
async fn test_adjustment_file_overrides_builtin_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("adjustments.csv");
    let mut csv = String::from("county,adjustment\n");
    for county in County::ALL {
        csv.push_str(&format!("{},0.0\n", county.name()));
    }
    csv = csv.replace("Kitui,0.0", "Kitui,0.4");
    std::fs::write(&path, csv).unwrap();

    let adjustments = loader::load_adjustments(Some(&path), 0).await.unwrap();
    assert_eq!(adjustments.get(County::Kitui), 0.4);
    assert_eq!(adjustments.get(County::Nairobi), 0.0);
}
