/// The twenty counties covered by the study, their climate zones, and the
/// built-in geographic adjustment table.
///
/// County names appear in several spellings across the input tables
/// ("Homa Bay", "homa_bay", "HOMA-BAY"); `County::from_str` accepts all of them.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum County {
    Baringo,
    Bungoma,
    Busia,
    #[serde(rename = "Elgeyo-Marakwet")]
    ElgeyoMarakwet,
    #[serde(rename = "Homa Bay")]
    HomaBay,
    Kakamega,
    Kericho,
    Kisii,
    Kisumu,
    Kitui,
    Machakos,
    Makueni,
    Meru,
    Migori,
    Nairobi,
    Nakuru,
    Narok,
    Nyeri,
    #[serde(rename = "Trans Nzoia")]
    TransNzoia,
    #[serde(rename = "Uasin Gishu")]
    UasinGishu,
}

/// Baseline climate regime of a county. Drives the reference water balance
/// used by the water stress index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateZone {
    SemiArid,
    SubHumid,
    Humid,
    Highland,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown county: {0}")]
pub struct UnknownCounty(pub String);

impl County {
    pub const ALL: [County; 20] = [
        County::Baringo,
        County::Bungoma,
        County::Busia,
        County::ElgeyoMarakwet,
        County::HomaBay,
        County::Kakamega,
        County::Kericho,
        County::Kisii,
        County::Kisumu,
        County::Kitui,
        County::Machakos,
        County::Makueni,
        County::Meru,
        County::Migori,
        County::Nairobi,
        County::Nakuru,
        County::Narok,
        County::Nyeri,
        County::TransNzoia,
        County::UasinGishu,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            County::Baringo => "Baringo",
            County::Bungoma => "Bungoma",
            County::Busia => "Busia",
            County::ElgeyoMarakwet => "Elgeyo-Marakwet",
            County::HomaBay => "Homa Bay",
            County::Kakamega => "Kakamega",
            County::Kericho => "Kericho",
            County::Kisii => "Kisii",
            County::Kisumu => "Kisumu",
            County::Kitui => "Kitui",
            County::Machakos => "Machakos",
            County::Makueni => "Makueni",
            County::Meru => "Meru",
            County::Migori => "Migori",
            County::Nairobi => "Nairobi",
            County::Nakuru => "Nakuru",
            County::Narok => "Narok",
            County::Nyeri => "Nyeri",
            County::TransNzoia => "Trans Nzoia",
            County::UasinGishu => "Uasin Gishu",
        }
    }

    /// Lowercase, underscore-separated form used in file names
    /// (e.g. `weather_data_homa_bay.csv`).
    pub fn slug(&self) -> String {
        self.name().to_lowercase().replace([' ', '-'], "_")
    }

    pub fn climate_zone(&self) -> ClimateZone {
        match self {
            County::Baringo | County::Kitui | County::Machakos | County::Makueni | County::Narok => {
                ClimateZone::SemiArid
            }
            County::HomaBay
            | County::Kisumu
            | County::Meru
            | County::Migori
            | County::Nairobi
            | County::Nakuru => ClimateZone::SubHumid,
            County::Bungoma | County::Busia | County::Kakamega | County::Kisii => ClimateZone::Humid,
            County::ElgeyoMarakwet
            | County::Kericho
            | County::Nyeri
            | County::TransNzoia
            | County::UasinGishu => ClimateZone::Highland,
        }
    }

    /// Built-in geographic/climatic adjustment in `[-1, 1]`.
    ///
    /// Positive values push the composite indices up (semi-arid baseline),
    /// negative values pull them down (high-rainfall baseline).
    pub fn default_geographic_adjustment(&self) -> f64 {
        match self {
            County::Baringo => 0.60,
            County::Bungoma => -0.30,
            County::Busia => -0.20,
            County::ElgeyoMarakwet => -0.10,
            County::HomaBay => 0.10,
            County::Kakamega => -0.40,
            County::Kericho => -0.35,
            County::Kisii => -0.45,
            County::Kisumu => 0.05,
            County::Kitui => 0.70,
            County::Machakos => 0.55,
            County::Makueni => 0.65,
            County::Meru => 0.05,
            County::Migori => 0.00,
            County::Nairobi => 0.15,
            County::Nakuru => 0.20,
            County::Narok => 0.35,
            County::Nyeri => -0.15,
            County::TransNzoia => -0.25,
            County::UasinGishu => -0.20,
        }
    }
}

fn normalize_name(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for County {
    type Err = UnknownCounty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_name(s);
        County::ALL
            .iter()
            .copied()
            .find(|county| normalize_name(county.name()) == wanted)
            .ok_or_else(|| UnknownCounty(s.trim().to_string()))
    }
}

impl fmt::Display for County {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ClimateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClimateZone::SemiArid => write!(f, "semi-arid"),
            ClimateZone::SubHumid => write!(f, "sub-humid"),
            ClimateZone::Humid => write!(f, "humid"),
            ClimateZone::Highland => write!(f, "highland"),
        }
    }
}

/// Static per-county geographic adjustment constants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoAdjustments {
    values: BTreeMap<County, f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdjustmentError {
    #[error("No geographic adjustment for county {0}")]
    MissingCounty(County),

    #[error("Adjustment for {county} out of range [-1, 1]: {value}")]
    OutOfRange { county: County, value: f64 },
}

impl GeoAdjustments {
    pub fn builtin() -> Self {
        Self {
            values: County::ALL
                .iter()
                .map(|c| (*c, c.default_geographic_adjustment()))
                .collect(),
        }
    }

    /// Build a table from explicit values. Every county must be present.
    pub fn from_values(values: BTreeMap<County, f64>) -> Result<Self, AdjustmentError> {
        for county in County::ALL {
            let value = *values
                .get(&county)
                .ok_or(AdjustmentError::MissingCounty(county))?;
            if !(-1.0..=1.0).contains(&value) {
                return Err(AdjustmentError::OutOfRange { county, value });
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, county: County) -> f64 {
        self.values.get(&county).copied().unwrap_or(0.0)
    }
}

impl Default for GeoAdjustments {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_county_variants() {
        assert_eq!("Homa Bay".parse::<County>().unwrap(), County::HomaBay);
        assert_eq!("homa_bay".parse::<County>().unwrap(), County::HomaBay);
        assert_eq!("ELGEYO MARAKWET".parse::<County>().unwrap(), County::ElgeyoMarakwet);
        assert_eq!(" nakuru ".parse::<County>().unwrap(), County::Nakuru);
    }

    #[test]
    fn test_parse_unknown_county() {
        let err = "Atlantis".parse::<County>().unwrap_err();
        assert_eq!(err, UnknownCounty("Atlantis".to_string()));
    }

    #[test]
    fn test_slug_round_trips_through_parser() {
        for county in County::ALL {
            assert_eq!(county.slug().parse::<County>().unwrap(), county);
        }
        assert_eq!(County::UasinGishu.slug(), "uasin_gishu");
    }

    #[test]
    fn test_builtin_adjustments_are_bounded() {
        let table = GeoAdjustments::builtin();
        for county in County::ALL {
            assert!((-1.0..=1.0).contains(&table.get(county)));
        }
    }

    #[test]
    fn test_from_values_requires_every_county() {
        let mut values: BTreeMap<County, f64> =
            County::ALL.iter().map(|c| (*c, 0.0)).collect();
        values.remove(&County::Kitui);
        assert_eq!(
            GeoAdjustments::from_values(values),
            Err(AdjustmentError::MissingCounty(County::Kitui))
        );
    }
}
