/// Versioned calibration table: every weight and threshold used by the
/// reconciler, the feature calculator, the score engine and the quality
/// validator lives here and nowhere else.
///
/// The built-in table is `Calibration::default()`. A TOML file may override any
/// subset of it and omitted sections keep their defaults. An `[indices.<name>]`
/// table replaces all weights of that index: weights it leaves out are 0, and
/// the weights it lists must still sum to 1.
///
/// ```toml
/// version = "2024.1-local"
///
/// [indices.water_scarcity]
/// water_stress = 0.5
/// temperature_stress = 0.2
/// soil_ph_risk = 0.15
/// geographic_adjustment = 0.15
/// ```
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::counties::{ClimateZone, County};
use crate::error::LoadError;
use crate::loader::read_text;
use crate::model::{CountyMonthKey, Field};

pub const DEFAULT_CALIBRATION_VERSION: &str = "2024.1";

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Failed to read calibration file: {0}")]
    Read(#[source] LoadError),

    #[error("Failed to parse calibration table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Weights of index {index} sum to {sum}, expected 1.0")]
    WeightSum { index: &'static str, sum: f64 },

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("{name} must be a finite number, got {value}")]
    NonFinite { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub version: String,
    pub features: FeatureThresholds,
    pub indices: IndexWeightTable,
    pub reconciliation: ReconciliationSettings,
    pub quality: QualityThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureThresholds {
    /// Temperature at which temperature stress starts to accrue
    pub temperature_stress_onset_c: f64,
    /// Temperature at which temperature stress reaches 1.0
    pub temperature_stress_ceiling_c: f64,
    /// A day counts as heat-stressed when its hourly maximum reaches this
    pub heat_stress_day_threshold_c: f64,
    pub ph_optimum_low: f64,
    pub ph_optimum_high: f64,
    /// pH distance outside the optimum band at which soil risk reaches 1.0
    pub ph_risk_span: f64,
    /// Blaney-Criddle mean daily fraction of annual daytime hours
    pub daylight_fraction: f64,
    pub benchmark_yield_t_ha: f64,
    pub reference_balance_mm: ReferenceBalances,
}

/// Monthly water balance (mm) at which a zone is considered unstressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceBalances {
    pub semi_arid: f64,
    pub sub_humid: f64,
    pub humid: f64,
    pub highland: f64,
}

impl ReferenceBalances {
    pub fn for_zone(&self, zone: ClimateZone) -> f64 {
        match zone {
            ClimateZone::SemiArid => self.semi_arid,
            ClimateZone::SubHumid => self.sub_humid,
            ClimateZone::Humid => self.humid,
            ClimateZone::Highland => self.highland,
        }
    }
}

/// Weights of one composite index. A zero weight means the feature is not used
/// by that index (and is therefore not required for it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IndexWeights {
    pub water_stress: f64,
    pub temperature_stress: f64,
    pub soil_ph_risk: f64,
    pub yield_gap: f64,
    pub irrigation_gap: f64,
    pub heat_stress_fraction: f64,
    pub geographic_adjustment: f64,
}

impl IndexWeights {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("water_stress", self.water_stress),
            ("temperature_stress", self.temperature_stress),
            ("soil_ph_risk", self.soil_ph_risk),
            ("yield_gap", self.yield_gap),
            ("irrigation_gap", self.irrigation_gap),
            ("heat_stress_fraction", self.heat_stress_fraction),
            ("geographic_adjustment", self.geographic_adjustment),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.water_stress
            + self.temperature_stress
            + self.soil_ph_risk
            + self.yield_gap
            + self.irrigation_gap
            + self.heat_stress_fraction
            + self.geographic_adjustment
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWeightTable {
    pub water_scarcity: IndexWeights,
    pub agricultural_risk: IndexWeights,
    pub irrigation_priority: IndexWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationSettings {
    /// Samples outside every polygon snap to the nearest centroid within this distance
    pub snap_tolerance_km: f64,
    /// Distinct observed days required before a monthly weather value is trusted
    pub min_days_observed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub max_null_rate: f64,
    pub required_fields: Vec<Field>,
    pub high_rainfall_mm: f64,
    pub severe_drought_stress: f64,
    pub station_satellite_abs_mm: f64,
    pub station_satellite_rel: f64,
    pub overrides: Vec<ConsistencyOverride>,
}

/// Accepted explanation for a key that would otherwise fail the
/// high-rainfall / severe-drought consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyOverride {
    pub county: County,
    pub year: i32,
    pub month: u32,
    pub reason: String,
}

impl QualityThresholds {
    pub fn override_for(&self, key: &CountyMonthKey) -> Option<&ConsistencyOverride> {
        self.overrides
            .iter()
            .find(|o| o.county == key.county && o.year == key.year && o.month == key.month)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            version: DEFAULT_CALIBRATION_VERSION.to_string(),
            features: FeatureThresholds::default(),
            indices: IndexWeightTable::default(),
            reconciliation: ReconciliationSettings::default(),
            quality: QualityThresholds::default(),
        }
    }
}

impl Default for FeatureThresholds {
    fn default() -> Self {
        Self {
            temperature_stress_onset_c: 30.0,
            temperature_stress_ceiling_c: 40.0,
            heat_stress_day_threshold_c: 30.0,
            ph_optimum_low: 6.0,
            ph_optimum_high: 7.0,
            ph_risk_span: 1.5,
            daylight_fraction: 0.27,
            benchmark_yield_t_ha: 2.5,
            reference_balance_mm: ReferenceBalances::default(),
        }
    }
}

impl Default for ReferenceBalances {
    fn default() -> Self {
        Self {
            semi_arid: 40.0,
            sub_humid: 60.0,
            humid: 90.0,
            highland: 75.0,
        }
    }
}

impl Default for IndexWeightTable {
    fn default() -> Self {
        Self {
            water_scarcity: IndexWeights {
                water_stress: 0.40,
                temperature_stress: 0.25,
                soil_ph_risk: 0.20,
                geographic_adjustment: 0.15,
                ..IndexWeights::default()
            },
            agricultural_risk: IndexWeights {
                water_stress: 0.30,
                temperature_stress: 0.15,
                soil_ph_risk: 0.15,
                yield_gap: 0.25,
                heat_stress_fraction: 0.05,
                geographic_adjustment: 0.10,
                ..IndexWeights::default()
            },
            irrigation_priority: IndexWeights {
                water_stress: 0.45,
                temperature_stress: 0.10,
                irrigation_gap: 0.30,
                geographic_adjustment: 0.15,
                ..IndexWeights::default()
            },
        }
    }
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            snap_tolerance_km: 25.0,
            min_days_observed: 20,
        }
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_null_rate: 0.25,
            required_fields: vec![Field::Temperature, Field::Rainfall, Field::SoilPh],
            high_rainfall_mm: 200.0,
            severe_drought_stress: 0.8,
            station_satellite_abs_mm: 50.0,
            station_satellite_rel: 0.5,
            overrides: Vec::new(),
        }
    }
}

impl Calibration {
    /// Parse a TOML override and validate the merged table.
    pub fn from_toml_str(raw: &str) -> Result<Self, CalibrationError> {
        let calibration: Calibration = toml::from_str(raw)?;
        calibration.validate()?;
        Ok(calibration)
    }

    /// Load the table from `path`, or the built-in table when no path is configured.
    /// The read is retried like every other input.
    pub async fn load(path: Option<&Path>, retries: usize) -> Result<Self, CalibrationError> {
        let Some(path) = path else {
            info!(version = DEFAULT_CALIBRATION_VERSION, "Using built-in calibration table");
            return Ok(Self::default());
        };

        let raw = read_text(path, retries).await.map_err(CalibrationError::Read)?;
        let calibration = Self::from_toml_str(&raw)?;
        info!(
            version = %calibration.version,
            path = %path.display(),
            "Loaded calibration table"
        );
        Ok(calibration)
    }

    /// Every numeric threshold, by name.
    fn thresholds(&self) -> [(&'static str, f64); 18] {
        let f = &self.features;
        let q = &self.quality;
        [
            ("temperature_stress_onset_c", f.temperature_stress_onset_c),
            ("temperature_stress_ceiling_c", f.temperature_stress_ceiling_c),
            ("heat_stress_day_threshold_c", f.heat_stress_day_threshold_c),
            ("ph_optimum_low", f.ph_optimum_low),
            ("ph_optimum_high", f.ph_optimum_high),
            ("ph_risk_span", f.ph_risk_span),
            ("daylight_fraction", f.daylight_fraction),
            ("benchmark_yield_t_ha", f.benchmark_yield_t_ha),
            ("reference_balance_mm.semi_arid", f.reference_balance_mm.semi_arid),
            ("reference_balance_mm.sub_humid", f.reference_balance_mm.sub_humid),
            ("reference_balance_mm.humid", f.reference_balance_mm.humid),
            ("reference_balance_mm.highland", f.reference_balance_mm.highland),
            ("snap_tolerance_km", self.reconciliation.snap_tolerance_km),
            ("max_null_rate", q.max_null_rate),
            ("high_rainfall_mm", q.high_rainfall_mm),
            ("severe_drought_stress", q.severe_drought_stress),
            ("station_satellite_abs_mm", q.station_satellite_abs_mm),
            ("station_satellite_rel", q.station_satellite_rel),
        ]
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if let Some((name, value)) = self.thresholds().into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(CalibrationError::NonFinite { name, value });
        }
        if self.reconciliation.snap_tolerance_km < 0.0 {
            return Err(CalibrationError::InvalidThreshold(
                "snap_tolerance_km must not be negative".to_string(),
            ));
        }

        for (index, weights) in [
            ("water_scarcity", &self.indices.water_scarcity),
            ("agricultural_risk", &self.indices.agricultural_risk),
            ("irrigation_priority", &self.indices.irrigation_priority),
        ] {
            for (name, value) in weights.named() {
                if !value.is_finite() {
                    return Err(CalibrationError::NonFinite { name, value });
                }
                if value < 0.0 {
                    return Err(CalibrationError::InvalidThreshold(format!(
                        "{index}.{name} must not be negative"
                    )));
                }
            }
            let sum = weights.sum();
            if (sum - 1.0).abs() > 1e-9 {
                return Err(CalibrationError::WeightSum { index, sum });
            }
        }

        let f = &self.features;
        if f.temperature_stress_ceiling_c <= f.temperature_stress_onset_c {
            return Err(CalibrationError::InvalidThreshold(
                "temperature_stress_ceiling_c must exceed temperature_stress_onset_c".to_string(),
            ));
        }
        if f.ph_optimum_high < f.ph_optimum_low || f.ph_risk_span <= 0.0 {
            return Err(CalibrationError::InvalidThreshold(
                "pH optimum band must be ordered and ph_risk_span positive".to_string(),
            ));
        }
        if f.benchmark_yield_t_ha <= 0.0 {
            return Err(CalibrationError::InvalidThreshold(
                "benchmark_yield_t_ha must be positive".to_string(),
            ));
        }
        let balances = &f.reference_balance_mm;
        if [balances.semi_arid, balances.sub_humid, balances.humid, balances.highland]
            .iter()
            .any(|b| *b <= 0.0)
        {
            return Err(CalibrationError::InvalidThreshold(
                "reference balances must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality.max_null_rate) {
            return Err(CalibrationError::InvalidThreshold(
                "max_null_rate must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        let calibration = Calibration::default();
        assert!(calibration.validate().is_ok());
        assert_eq!(calibration.version, "2024.1");
        assert!((calibration.indices.water_scarcity.water_stress - 0.40).abs() < 1e-12);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let calibration = Calibration::from_toml_str(
            r#"
            version = "2024.2"

            [features]
            benchmark_yield_t_ha = 3.0

            [quality]
            max_null_rate = 0.1
            required_fields = ["temperature", "rainfall"]
            "#,
        )
        .unwrap();

        assert_eq!(calibration.version, "2024.2");
        assert_eq!(calibration.features.benchmark_yield_t_ha, 3.0);
        assert_eq!(calibration.features.temperature_stress_ceiling_c, 40.0);
        assert_eq!(
            calibration.quality.required_fields,
            vec![Field::Temperature, Field::Rainfall]
        );
        assert_eq!(calibration.indices, IndexWeightTable::default());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = Calibration::from_toml_str(
            r#"
            [indices.water_scarcity]
            water_stress = 0.9
            temperature_stress = 0.25
            "#,
        )
        .unwrap_err();

        match err {
            CalibrationError::WeightSum { index, sum } => {
                assert_eq!(index, "water_scarcity");
                assert!((sum - 1.15).abs() < 1e-9);
            }
            other => panic!("Expected WeightSum error, got {other:?}"),
        }
    }

    #[test]
    fn test_override_lookup() {
        let calibration = Calibration::from_toml_str(
            r#"
            [[quality.overrides]]
            county = "Kitui"
            year = 2020
            month = 4
            reason = "flash flood after prolonged drought"
            "#,
        )
        .unwrap();

        let key = CountyMonthKey {
            county: County::Kitui,
            year: 2020,
            month: 4,
        };
        assert_eq!(
            calibration.quality.override_for(&key).map(|o| o.reason.as_str()),
            Some("flash flood after prolonged drought")
        );
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let err = Calibration::from_toml_str(
            r#"
            [features.reference_balance_mm]
            semi_arid = nan
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::NonFinite {
                name: "reference_balance_mm.semi_arid",
                ..
            }
        ));

        let err = Calibration::from_toml_str(
            r#"
            [quality]
            high_rainfall_mm = inf
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CalibrationError::NonFinite { name: "high_rainfall_mm", .. }));
    }

    #[test]
    fn test_non_finite_weight_is_rejected() {
        let mut calibration = Calibration::default();
        calibration.indices.agricultural_risk.yield_gap = f64::NAN;
        assert!(matches!(
            calibration.validate(),
            Err(CalibrationError::NonFinite { name: "yield_gap", .. })
        ));
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let err = Calibration::from_toml_str(
            r#"
            [indices.water_scarcity]
            water_stress = 1.2
            temperature_stress = -0.2
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidThreshold(_)));
    }

    #[test]
    fn test_partial_index_table_zeroes_omitted_weights() {
        let calibration = Calibration::from_toml_str(
            r#"
            [indices.water_scarcity]
            water_stress = 0.6
            temperature_stress = 0.4
            "#,
        )
        .unwrap();

        let weights = &calibration.indices.water_scarcity;
        assert_eq!(weights.soil_ph_risk, 0.0);
        assert_eq!(weights.geographic_adjustment, 0.0);
        assert_eq!(
            calibration.indices.agricultural_risk,
            IndexWeightTable::default().agricultural_risk
        );
    }

    #[tokio::test]
    async fn test_load_without_path_uses_builtin_table() {
        let calibration = Calibration::load(None, 0).await.unwrap();
        assert_eq!(calibration, Calibration::default());
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("calibration.toml");
        tokio::fs::write(&path, "version = \"2025.0\"\n").await.unwrap();

        let calibration = Calibration::load(Some(&path), 2).await.unwrap();
        assert_eq!(calibration.version, "2025.0");
    }
}
