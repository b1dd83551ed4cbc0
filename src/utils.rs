use regex::Regex;

use crate::counties::County;
use crate::model::YearMonth;

/// Shared utility functions for the integration pipeline
///
/// Extract the year-month a raster file covers from its file name
///
/// Rainfall products are published with the period embedded in the name in a
/// few different shapes: "chirps_2019_03.asc", "rainfall-2019-03.asc",
/// "2019_03_precip.asc". This function extracts the first 4-digit year
/// (1900-2099) followed by a 2-digit month, separated by `_`, `-` or nothing.
///
/// # Examples
///
/// ```
/// use county_water_risk::utils::extract_year_month;
///
/// assert_eq!(extract_year_month("chirps_2019_03.asc").unwrap().to_string(), "2019-03");
/// assert_eq!(extract_year_month("rainfall-2021-11.asc").unwrap().to_string(), "2021-11");
/// assert_eq!(extract_year_month("202002_precip.asc").unwrap().to_string(), "2020-02");
/// assert!(extract_year_month("rainfall_2019_13.asc").is_err());
/// ```
pub fn extract_year_month(file_name: &str) -> Result<YearMonth, &'static str> {
    let re = Regex::new(r"(?:^|[^0-9])((?:19|20)\d{2})[-_]?(0[1-9]|1[0-2])(?:[^0-9]|$)")
        .map_err(|_| "Invalid year-month pattern")?;

    let caps = re
        .captures(file_name)
        .ok_or("No year-month found in file name")?;
    let year = caps[1].parse::<i32>().map_err(|_| "Invalid year")?;
    let month = caps[2].parse::<u32>().map_err(|_| "Invalid month")?;

    YearMonth::new(year, month).ok_or("Invalid month")
}

/// Extract the county from a per-county weather file name
///
/// Weather exports are named `weather_data_<county>.csv`, where the county
/// part may use underscores, hyphens or spaces.
///
/// # Examples
///
/// ```
/// use county_water_risk::counties::County;
/// use county_water_risk::utils::county_from_weather_file;
///
/// assert_eq!(county_from_weather_file("weather_data_baringo.csv"), Some(County::Baringo));
/// assert_eq!(county_from_weather_file("weather_data_homa_bay.csv"), Some(County::HomaBay));
/// assert_eq!(county_from_weather_file("soil_properties.csv"), None);
/// ```
pub fn county_from_weather_file(file_name: &str) -> Option<County> {
    let stem = file_name.strip_suffix(".csv")?;
    let county_part = stem.strip_prefix("weather_data_")?;
    county_part.parse::<County>().ok()
}

/// Normalize -0.0 to 0.0 so identical runs serialize identically
pub fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0 // Converts both 0.0 and -0.0 to 0.0
    } else {
        value
    }
}
