#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use county_water_risk::adapters::dashboard::DashboardRecord;
use county_water_risk::adapters::maize::MaizeRecord;
use county_water_risk::adapters::soil::SoilSample;
use county_water_risk::adapters::weather::HourlyObservation;
use county_water_risk::config::Config;
use county_water_risk::counties::{County, GeoAdjustments};
use county_water_risk::geo::{CountyBoundaries, CountyBoundary, GeoPoint};
use county_water_risk::model::{StudyWindow, YearMonth};
use county_water_risk::pipeline::RawInputs;
use county_water_risk::raster::AsciiGrid;

/// Observation hours per day in the synthetic weather series
pub const HOURS: [u32; 4] = [0, 6, 12, 18];

/// Row/column of a county in the 5×4 test grid (county order, row-major).
pub fn grid_cell(county: County) -> (f64, f64) {
    let i = County::ALL.iter().position(|c| *c == county).unwrap_or(0);
    ((i / 5) as f64, 30.0 + (i % 5) as f64)
}

/// Twenty 1°×1° county squares starting at (lat 0, lon 30).
pub fn grid_boundaries() -> CountyBoundaries {
    CountyBoundaries::new(County::ALL.iter().map(|c| square(*c)).collect()).unwrap()
}

fn square(county: County) -> CountyBoundary {
    let (lat0, lon0) = grid_cell(county);
    CountyBoundary {
        county,
        centroid: GeoPoint::new(lat0 + 0.5, lon0 + 0.5),
        rings: vec![vec![
            GeoPoint::new(lat0, lon0),
            GeoPoint::new(lat0, lon0 + 1.0),
            GeoPoint::new(lat0 + 1.0, lon0 + 1.0),
            GeoPoint::new(lat0 + 1.0, lon0),
        ]],
    }
}

fn county_index(county: County) -> f64 {
    County::ALL.iter().position(|c| *c == county).unwrap_or(0) as f64
}

/// Satellite rainfall for a month, uniform over the grid.
pub fn monthly_rainfall(year_month: YearMonth) -> f64 {
    60.0 + 5.0 * year_month.month as f64
}

pub fn weather_series(county: County, window: &StudyWindow) -> Vec<HourlyObservation> {
    let base = 16.0 + 0.4 * county_index(county);
    let mut series = Vec::new();
    for year_month in window.year_months() {
        let days = year_month.days_in_month();
        let hourly_rain = monthly_rainfall(year_month) / (days * HOURS.len() as u32) as f64;
        for day in 1..=days {
            let date = NaiveDate::from_ymd_opt(year_month.year, year_month.month, day).unwrap();
            for hour in HOURS {
                series.push(HourlyObservation {
                    timestamp: date.and_hms_opt(hour, 0, 0).unwrap(),
                    temperature_c: Some(if hour == 12 { base + 10.0 } else { base }),
                    precipitation_mm: Some(hourly_rain),
                    humidity_pct: Some(65.0),
                    pressure_hpa: Some(850.0),
                });
            }
        }
    }
    series
}

/// Three samples per county with pH 6.0, 6.5 and 7.0.
pub fn soil_samples() -> Vec<SoilSample> {
    County::ALL
        .iter()
        .flat_map(|county| {
            let (lat0, lon0) = grid_cell(*county);
            [(0.2, 6.0), (0.5, 6.5), (0.8, 7.0)].into_iter().map(move |(offset, ph)| SoilSample {
                sample_id: format!("{}-{offset}", county.slug()),
                location: GeoPoint::new(lat0 + offset, lon0 + offset),
                ph_h2o: Some(ph),
                organic_carbon_pct: Some(1.5),
                clay_pct: Some(30.0),
            })
        })
        .collect()
}

/// A 0.5° raster covering the whole grid with a uniform value.
pub fn covering_grid(value: f64) -> AsciiGrid {
    let (ncols, nrows) = (10, 8);
    AsciiGrid {
        ncols,
        nrows,
        xll: 30.0,
        yll: 0.0,
        cellsize: 0.5,
        nodata: -9999.0,
        values: vec![value; ncols * nrows],
    }
}

pub fn rasters(window: &StudyWindow) -> BTreeMap<YearMonth, AsciiGrid> {
    window
        .year_months()
        .into_iter()
        .map(|ym| (ym, covering_grid(monthly_rainfall(ym))))
        .collect()
}

pub fn maize_records(window: &StudyWindow) -> Vec<MaizeRecord> {
    County::ALL
        .iter()
        .flat_map(|county| {
            let production = 30_000.0 + 1_500.0 * county_index(*county);
            (window.start_year..=window.end_year()).map(move |year| MaizeRecord {
                county: *county,
                year,
                production_tonnes: Some(production),
                area_ha: Some(20_000.0),
            })
        })
        .collect()
}

pub fn dashboard_records() -> Vec<DashboardRecord> {
    County::ALL
        .iter()
        .map(|county| DashboardRecord {
            county: *county,
            year: None,
            irrigation_coverage_pct: Some(4.0 + county_index(*county)),
            water_access_pct: Some(40.0 + county_index(*county)),
        })
        .collect()
}

/// Complete, clean inputs for every county and month of `window`.
pub fn synthetic_inputs(window: &StudyWindow) -> RawInputs {
    RawInputs {
        weather: County::ALL
            .iter()
            .map(|c| (*c, weather_series(*c, window)))
            .collect(),
        soil: soil_samples(),
        rainfall: rasters(window),
        maize: maize_records(window),
        dashboard: dashboard_records(),
        boundaries: grid_boundaries(),
        adjustments: GeoAdjustments::builtin(),
    }
}

// ---------------------------------------------------------------------------
// On-disk fixtures
// ---------------------------------------------------------------------------

fn grid_text(grid: &AsciiGrid) -> String {
    let mut out = format!(
        "ncols {}\nnrows {}\nxllcorner {}\nyllcorner {}\ncellsize {}\nNODATA_value {}\n",
        grid.ncols, grid.nrows, grid.xll, grid.yll, grid.cellsize, grid.nodata
    );
    for row in grid.values.chunks(grid.ncols) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

fn boundaries_json(boundaries: &CountyBoundaries) -> String {
    let counties: Vec<serde_json::Value> = boundaries
        .iter()
        .map(|b| {
            serde_json::json!({
                "county": b.county.name(),
                "centroid": [b.centroid.lon, b.centroid.lat],
                "rings": b.rings.iter()
                    .map(|ring| ring.iter().map(|p| [p.lon, p.lat]).collect::<Vec<_>>())
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({ "counties": counties }).to_string()
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write `inputs` under `data_dir` using the default file layout.
pub fn write_data_dir(data_dir: &Path, inputs: &RawInputs) {
    let weather_dir = data_dir.join("weather_data");
    let raster_dir = data_dir.join("rainfall_rasters");
    std::fs::create_dir_all(&weather_dir).unwrap();
    std::fs::create_dir_all(&raster_dir).unwrap();

    for (county, series) in &inputs.weather {
        let mut csv = String::from("timestamp,temperature_c,precipitation_mm,humidity_pct,pressure_hpa\n");
        for o in series {
            writeln!(
                csv,
                "{},{},{},{},{}",
                o.timestamp.format("%Y-%m-%d %H:%M:%S"),
                optional(o.temperature_c),
                optional(o.precipitation_mm),
                optional(o.humidity_pct),
                optional(o.pressure_hpa)
            )
            .unwrap();
        }
        std::fs::write(weather_dir.join(format!("weather_data_{}.csv", county.slug())), csv).unwrap();
    }

    for (year_month, grid) in &inputs.rainfall {
        let name = format!("chirps_{}_{:02}.asc", year_month.year, year_month.month);
        std::fs::write(raster_dir.join(name), grid_text(grid)).unwrap();
    }

    let mut soil = String::from("sample_id,latitude,longitude,ph_h2o,organic_carbon_pct,clay_pct\n");
    for s in &inputs.soil {
        writeln!(
            soil,
            "{},{},{},{},{},{}",
            s.sample_id,
            s.location.lat,
            s.location.lon,
            optional(s.ph_h2o),
            optional(s.organic_carbon_pct),
            optional(s.clay_pct)
        )
        .unwrap();
    }
    std::fs::write(data_dir.join("soil_properties.csv"), soil).unwrap();

    let mut maize = String::from("county,year,production_tonnes,area_ha\n");
    for m in &inputs.maize {
        writeln!(
            maize,
            "{},{},{},{}",
            m.county.name(),
            m.year,
            optional(m.production_tonnes),
            optional(m.area_ha)
        )
        .unwrap();
    }
    std::fs::write(data_dir.join("maize_production.csv"), maize).unwrap();

    let mut dashboard = String::from("county,year,irrigation_coverage_pct,water_access_pct\n");
    for d in &inputs.dashboard {
        writeln!(
            dashboard,
            "{},{},{},{}",
            d.county.name(),
            d.year.map(|y| y.to_string()).unwrap_or_default(),
            optional(d.irrigation_coverage_pct),
            optional(d.water_access_pct)
        )
        .unwrap();
    }
    std::fs::write(data_dir.join("dashboard_aggregates.csv"), dashboard).unwrap();

    std::fs::write(
        data_dir.join("county_boundaries.json"),
        boundaries_json(&inputs.boundaries),
    )
    .unwrap();
}

/// Configuration pointing at the default layout under `data_dir`.
pub fn config_for(data_dir: &Path, window: &StudyWindow) -> Config {
    let data_dir: PathBuf = data_dir.to_path_buf();
    Config {
        weather_dir: data_dir.join("weather_data"),
        soil_path: data_dir.join("soil_properties.csv"),
        raster_dir: data_dir.join("rainfall_rasters"),
        maize_path: data_dir.join("maize_production.csv"),
        dashboard_path: data_dir.join("dashboard_aggregates.csv"),
        boundaries_path: data_dir.join("county_boundaries.json"),
        adjustments_path: None,
        calibration_path: None,
        output_dir: data_dir.join("output"),
        study_start_year: window.start_year,
        study_years: window.years,
        read_concurrency: 4,
        read_retries: 1,
        data_dir,
    }
}
