pub mod calibration;

pub use calibration::{Calibration, CalibrationError};

use std::env;
use std::path::PathBuf;

use crate::model::StudyWindow;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub weather_dir: PathBuf,
    pub soil_path: PathBuf,
    pub raster_dir: PathBuf,
    pub maize_path: PathBuf,
    pub dashboard_path: PathBuf,
    pub boundaries_path: PathBuf,
    pub adjustments_path: Option<PathBuf>,
    pub calibration_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub study_start_year: i32,
    pub study_years: u32,
    pub read_concurrency: usize,
    pub read_retries: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let data_dir = PathBuf::from(env::var("DATA_DIR")?);
        let under_data = |var: &str, default: &str| {
            env::var(var)
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join(default))
        };

        Ok(Config {
            weather_dir: under_data("WEATHER_DIR", "weather_data"),
            soil_path: under_data("SOIL_PATH", "soil_properties.csv"),
            raster_dir: under_data("RASTER_DIR", "rainfall_rasters"),
            maize_path: under_data("MAIZE_PATH", "maize_production.csv"),
            dashboard_path: under_data("DASHBOARD_PATH", "dashboard_aggregates.csv"),
            boundaries_path: under_data("BOUNDARIES_PATH", "county_boundaries.json"),
            adjustments_path: env::var("ADJUSTMENTS_PATH").ok().map(PathBuf::from),
            calibration_path: env::var("CALIBRATION_PATH").ok().map(PathBuf::from),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("output")),
            study_start_year: env::var("STUDY_START_YEAR")
                .unwrap_or_else(|_| "2019".to_string())
                .parse()
                .unwrap_or(2019),
            study_years: env::var("STUDY_YEARS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            read_concurrency: env::var("READ_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            read_retries: env::var("READ_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            data_dir,
        })
    }

    pub fn study_window(&self) -> StudyWindow {
        StudyWindow::new(self.study_start_year, self.study_years)
    }

    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join("county_month_table.csv")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("quality_report.json")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("county_summary.json")
    }
}
