/// Reads every raw input of a run from disk.
///
/// File reads run on the tokio runtime and are retried with exponential
/// backoff on transient I/O errors. Per-county weather files and per-month
/// rasters are read concurrently (bounded by `read_concurrency`), and parsing
/// runs on `spawn_blocking`. Everything is collected into ordered maps before
/// the pipeline starts.
pub mod tables;
pub mod workbook;

use backon::{ExponentialBuilder, Retryable};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::adapters::dashboard::DashboardRecord;
use crate::adapters::maize::MaizeRecord;
use crate::adapters::soil::SoilSample;
use crate::adapters::weather::HourlyObservation;
use crate::config::Config;
use crate::counties::{County, GeoAdjustments};
use crate::error::{LoadError, PipelineError, RequiredInput};
use crate::geo::{parse_boundaries, CountyBoundaries};
use crate::model::{SourceId, YearMonth};
use crate::pipeline::RawInputs;
use crate::raster::AsciiGrid;
use crate::utils::{county_from_weather_file, extract_year_month};

fn backoff(retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(retries)
}

/// Read a whole file as text, retrying transient failures.
///
/// `NotFound` and permission errors are not retried.
pub async fn read_text(path: &Path, retries: usize) -> Result<String, LoadError> {
    (|| async { tokio::fs::read_to_string(path).await })
        .retry(backoff(retries))
        .sleep(tokio::time::sleep)
        .when(is_transient)
        .notify(|err: &io::Error, delay: Duration| {
            warn!(path = %path.display(), error = %err, ?delay, "Retrying read");
        })
        .await
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Binary counterpart of [`read_text`], used for workbooks.
pub async fn read_bytes(path: &Path, retries: usize) -> Result<Vec<u8>, LoadError> {
    (|| async { tokio::fs::read(path).await })
        .retry(backoff(retries))
        .sleep(tokio::time::sleep)
        .when(is_transient)
        .notify(|err: &io::Error, delay: Duration| {
            warn!(path = %path.display(), error = %err, ?delay, "Retrying read");
        })
        .await
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn is_transient(err: &io::Error) -> bool {
    !matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidData
    )
}

/// Run a parser on the blocking pool.
async fn parse_blocking<T, F>(parse: F) -> Result<T, LoadError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LoadError> + Send + 'static,
{
    tokio::task::spawn_blocking(parse)
        .await
        .map_err(|e| LoadError::Task(e.to_string()))?
}

/// Fail with `MissingSourceFile` unless `path` exists.
async fn require(input: RequiredInput, path: &Path) -> Result<(), PipelineError> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(PipelineError::MissingSourceFile {
            input,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()),
    }
}

async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_error = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Locate `weather_data_<county>.csv` files. Unrelated files are skipped.
pub async fn discover_weather_files(dir: &Path) -> Result<BTreeMap<County, PathBuf>, LoadError> {
    let mut files = BTreeMap::new();
    for path in list_dir(dir).await? {
        let Some(county) = county_from_weather_file(file_name(&path)) else {
            debug!(path = %path.display(), "Skipping non-weather file");
            continue;
        };
        if files.insert(county, path.clone()).is_some() {
            return Err(LoadError::DuplicateWeatherFile { county, path });
        }
    }
    Ok(files)
}

/// Locate `.asc` rasters and the month each one covers.
pub async fn discover_rasters(dir: &Path) -> Result<BTreeMap<YearMonth, PathBuf>, LoadError> {
    let mut files = BTreeMap::new();
    for path in list_dir(dir).await? {
        let is_grid = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("asc"));
        if !is_grid {
            continue;
        }
        let year_month = match extract_year_month(file_name(&path)) {
            Ok(ym) => ym,
            Err(reason) => {
                warn!(path = %path.display(), reason, "Skipping raster without a year-month");
                continue;
            }
        };
        if files.insert(year_month, path.clone()).is_some() {
            return Err(LoadError::DuplicateRaster { year_month, path });
        }
    }
    Ok(files)
}

#[instrument(skip_all, fields(files = files.len()))]
pub async fn load_weather(
    files: BTreeMap<County, PathBuf>,
    concurrency: usize,
    retries: usize,
) -> Result<BTreeMap<County, Vec<HourlyObservation>>, LoadError> {
    let loaded: Vec<(County, Vec<HourlyObservation>)> = stream::iter(files)
        .map(|(county, path)| async move {
            let raw = read_text(&path, retries).await?;
            let observations = parse_blocking(move || tables::parse_weather(&path, &raw)).await?;
            debug!(county = %county, rows = observations.len(), "Weather file parsed");
            Ok::<_, LoadError>((county, observations))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(loaded.into_iter().collect())
}

#[instrument(skip_all, fields(files = files.len()))]
pub async fn load_rasters(
    files: BTreeMap<YearMonth, PathBuf>,
    concurrency: usize,
    retries: usize,
) -> Result<BTreeMap<YearMonth, AsciiGrid>, LoadError> {
    let loaded: Vec<(YearMonth, AsciiGrid)> = stream::iter(files)
        .map(|(year_month, path)| async move {
            let raw = read_text(&path, retries).await?;
            let grid = parse_blocking(move || {
                AsciiGrid::parse(&raw).map_err(|source| LoadError::Grid { path, source })
            })
            .await?;
            Ok::<_, LoadError>((year_month, grid))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(loaded.into_iter().collect())
}

pub async fn load_soil(path: &Path, retries: usize) -> Result<Vec<SoilSample>, LoadError> {
    let raw = read_text(path, retries).await?;
    let path = path.to_path_buf();
    parse_blocking(move || tables::parse_soil(&path, &raw)).await
}

/// `.xlsx` workbooks go through calamine, anything else is read as CSV.
pub async fn load_maize(path: &Path, retries: usize) -> Result<Vec<MaizeRecord>, LoadError> {
    let is_workbook = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if is_workbook {
        let bytes = read_bytes(path, retries).await?;
        let path = path.to_path_buf();
        return parse_blocking(move || workbook::read_maize_workbook(&path, bytes)).await;
    }
    let raw = read_text(path, retries).await?;
    let path = path.to_path_buf();
    parse_blocking(move || tables::parse_maize(&path, &raw)).await
}

pub async fn load_dashboard(path: &Path, retries: usize) -> Result<Vec<DashboardRecord>, LoadError> {
    let raw = read_text(path, retries).await?;
    let path = path.to_path_buf();
    parse_blocking(move || tables::parse_dashboard(&path, &raw)).await
}

pub async fn load_boundaries(path: &Path, retries: usize) -> Result<CountyBoundaries, LoadError> {
    let raw = read_text(path, retries).await?;
    let boundaries = parse_boundaries(&raw).map_err(|source| LoadError::Boundaries {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(CountyBoundaries::new(boundaries)?)
}

pub async fn load_adjustments(path: Option<&Path>, retries: usize) -> Result<GeoAdjustments, LoadError> {
    let Some(path) = path else {
        return Ok(GeoAdjustments::builtin());
    };
    let raw = read_text(path, retries).await?;
    let values = tables::parse_adjustments(path, &raw)?;
    info!(path = %path.display(), "Loaded geographic adjustments");
    Ok(GeoAdjustments::from_values(values)?)
}

/// Load every input named by `config`.
#[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
pub async fn load_inputs(config: &Config) -> Result<RawInputs, PipelineError> {
    for (source_id, path) in [
        (SourceId::Weather, &config.weather_dir),
        (SourceId::Soil, &config.soil_path),
        (SourceId::Rainfall, &config.raster_dir),
        (SourceId::Maize, &config.maize_path),
        (SourceId::Dashboard, &config.dashboard_path),
    ] {
        require(RequiredInput::Source(source_id), path).await?;
    }
    require(RequiredInput::Boundaries, &config.boundaries_path).await?;

    let retries = config.read_retries;
    let concurrency = config.read_concurrency;

    let weather_files = discover_weather_files(&config.weather_dir).await?;
    let raster_files = discover_rasters(&config.raster_dir).await?;
    info!(
        weather_files = weather_files.len(),
        rasters = raster_files.len(),
        "Discovered input files"
    );

    let (weather, rainfall, soil, maize, dashboard, boundaries, adjustments) = tokio::try_join!(
        load_weather(weather_files, concurrency, retries),
        load_rasters(raster_files, concurrency, retries),
        load_soil(&config.soil_path, retries),
        load_maize(&config.maize_path, retries),
        load_dashboard(&config.dashboard_path, retries),
        load_boundaries(&config.boundaries_path, retries),
        load_adjustments(config.adjustments_path.as_deref(), retries),
    )?;

    info!(
        weather_counties = weather.len(),
        rasters = rainfall.len(),
        soil_samples = soil.len(),
        maize_records = maize.len(),
        dashboard_records = dashboard.len(),
        "All inputs loaded"
    );

    Ok(RawInputs {
        weather,
        soil,
        rainfall,
        maize,
        dashboard,
        boundaries,
        adjustments,
    })
}
