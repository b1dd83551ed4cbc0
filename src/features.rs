/// Derived feature calculator.
///
/// Every feature is a pure function of one joined record and the calibration
/// thresholds. A feature whose inputs are missing is `Err(MissingInput)` naming
/// the first absent field; it is never defaulted.
use serde::Serialize;

use crate::config::calibration::FeatureThresholds;
use crate::error::MissingInput;
use crate::join::JoinedRecord;
use crate::model::{CountyMonthKey, Field};

pub type Feature = Result<f64, MissingInput>;

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub key: CountyMonthKey,
    pub evapotranspiration_mm: Feature,
    pub water_balance_mm: Feature,
    pub water_stress: Feature,
    pub temperature_stress: Feature,
    pub soil_ph_risk: Feature,
    pub irrigation_needed: Result<bool, MissingInput>,
    pub irrigation_volume_l_ha: Feature,
    pub yield_t_ha: Feature,
    pub yield_gap: Feature,
    pub irrigation_gap: Feature,
    pub heat_stress_fraction: Feature,
}

/// Names of the derived columns, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedField {
    Evapotranspiration,
    WaterBalance,
    WaterStress,
    TemperatureStress,
    SoilPhRisk,
    IrrigationNeeded,
    IrrigationVolume,
    Yield,
    YieldGap,
    IrrigationGap,
    HeatStressFraction,
}

impl DerivedField {
    pub const ALL: [DerivedField; 11] = [
        DerivedField::Evapotranspiration,
        DerivedField::WaterBalance,
        DerivedField::WaterStress,
        DerivedField::TemperatureStress,
        DerivedField::SoilPhRisk,
        DerivedField::IrrigationNeeded,
        DerivedField::IrrigationVolume,
        DerivedField::Yield,
        DerivedField::YieldGap,
        DerivedField::IrrigationGap,
        DerivedField::HeatStressFraction,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            DerivedField::Evapotranspiration => "evapotranspiration_mm",
            DerivedField::WaterBalance => "water_balance_mm",
            DerivedField::WaterStress => "water_stress_index",
            DerivedField::TemperatureStress => "temperature_stress",
            DerivedField::SoilPhRisk => "soil_ph_risk",
            DerivedField::IrrigationNeeded => "irrigation_needed",
            DerivedField::IrrigationVolume => "irrigation_volume_l_ha",
            DerivedField::Yield => "yield_t_ha",
            DerivedField::YieldGap => "yield_gap",
            DerivedField::IrrigationGap => "irrigation_gap",
            DerivedField::HeatStressFraction => "heat_stress_fraction",
        }
    }
}

impl DerivedFeatures {
    /// Numeric value of a derived column; the irrigation flag reads as 0/1.
    pub fn get(&self, field: DerivedField) -> Feature {
        match field {
            DerivedField::Evapotranspiration => self.evapotranspiration_mm,
            DerivedField::WaterBalance => self.water_balance_mm,
            DerivedField::WaterStress => self.water_stress,
            DerivedField::TemperatureStress => self.temperature_stress,
            DerivedField::SoilPhRisk => self.soil_ph_risk,
            DerivedField::IrrigationNeeded => {
                self.irrigation_needed.map(|needed| if needed { 1.0 } else { 0.0 })
            }
            DerivedField::IrrigationVolume => self.irrigation_volume_l_ha,
            DerivedField::Yield => self.yield_t_ha,
            DerivedField::YieldGap => self.yield_gap,
            DerivedField::IrrigationGap => self.irrigation_gap,
            DerivedField::HeatStressFraction => self.heat_stress_fraction,
        }
    }
}

fn require(record: &JoinedRecord, field: Field) -> Feature {
    record.value(field).ok_or(MissingInput {
        key: record.key,
        field,
    })
}

/// Compute every derived feature for one joined record.
pub fn derive(record: &JoinedRecord, thresholds: &FeatureThresholds) -> DerivedFeatures {
    let key = record.key;
    let days = key.year_month().days_in_month();
    let zone = key.county.climate_zone();

    let temperature = require(record, Field::Temperature);
    let evapotranspiration_mm =
        temperature.map(|t| evapotranspiration(t, days, thresholds.daylight_fraction));
    let water_balance_mm = require(record, Field::Rainfall)
        .and_then(|p| evapotranspiration_mm.map(|et| water_balance(p, et)));
    let water_stress = water_balance_mm
        .map(|b| water_stress_index(b, thresholds.reference_balance_mm.for_zone(zone)));

    let temperature_stress = temperature.map(|t| {
        temperature_stress(
            t,
            thresholds.temperature_stress_onset_c,
            thresholds.temperature_stress_ceiling_c,
        )
    });

    let soil_ph_risk = require(record, Field::SoilPh).map(|ph| {
        soil_ph_risk(
            ph,
            thresholds.ph_optimum_low,
            thresholds.ph_optimum_high,
            thresholds.ph_risk_span,
        )
    });

    let production = require(record, Field::MaizeProduction);
    let area = require(record, Field::MaizeArea).and_then(|a| {
        if a > 0.0 {
            Ok(a)
        } else {
            Err(MissingInput {
                key,
                field: Field::MaizeArea,
            })
        }
    });
    let yield_t_ha = production.and_then(|p| area.map(|a| p / a));
    let yield_gap = yield_t_ha.map(|y| yield_gap(y, thresholds.benchmark_yield_t_ha));

    DerivedFeatures {
        key,
        evapotranspiration_mm,
        water_balance_mm,
        water_stress,
        temperature_stress,
        soil_ph_risk,
        irrigation_needed: water_balance_mm.map(|b| b < 0.0),
        irrigation_volume_l_ha: water_balance_mm.map(irrigation_volume),
        yield_t_ha,
        yield_gap,
        irrigation_gap: require(record, Field::IrrigationCoverage).map(irrigation_gap),
        heat_stress_fraction: require(record, Field::HeatStressDays)
            .map(|d| heat_stress_fraction(d, days)),
    }
}

/// Blaney–Criddle reference evapotranspiration for a month (mm).
pub fn evapotranspiration(mean_temperature_c: f64, days_in_month: u32, daylight_fraction: f64) -> f64 {
    (days_in_month as f64 * daylight_fraction * (0.46 * mean_temperature_c + 8.0)).max(0.0)
}

pub fn water_balance(precipitation_mm: f64, evapotranspiration_mm: f64) -> f64 {
    precipitation_mm - evapotranspiration_mm
}

/// 0 at or above the zone's reference balance, 1 at a zero or negative balance.
pub fn water_stress_index(water_balance_mm: f64, reference_balance_mm: f64) -> f64 {
    (1.0 - water_balance_mm / reference_balance_mm).clamp(0.0, 1.0)
}

/// Linear ramp from `onset_c` (0) to `ceiling_c` (1).
///
/// ```
/// use county_water_risk::features::temperature_stress;
///
/// assert_eq!(temperature_stress(35.0, 30.0, 40.0), 0.5);
/// assert_eq!(temperature_stress(25.0, 30.0, 40.0), 0.0);
/// assert_eq!(temperature_stress(44.0, 30.0, 40.0), 1.0);
/// ```
pub fn temperature_stress(temperature_c: f64, onset_c: f64, ceiling_c: f64) -> f64 {
    ((temperature_c - onset_c) / (ceiling_c - onset_c)).clamp(0.0, 1.0)
}

/// Distance of `ph` from the optimum band, scaled by `span`.
pub fn soil_ph_risk(ph: f64, optimum_low: f64, optimum_high: f64, span: f64) -> f64 {
    let distance = if ph < optimum_low {
        optimum_low - ph
    } else if ph > optimum_high {
        ph - optimum_high
    } else {
        0.0
    };
    (distance / span).clamp(0.0, 1.0)
}

/// Water (L/ha) needed to close a negative monthly balance. 1 mm over 1 ha is 10 000 L.
pub fn irrigation_volume(water_balance_mm: f64) -> f64 {
    (-water_balance_mm).max(0.0) * 10_000.0
}

pub fn yield_gap(yield_t_ha: f64, benchmark_t_ha: f64) -> f64 {
    (1.0 - yield_t_ha / benchmark_t_ha).clamp(0.0, 1.0)
}

pub fn irrigation_gap(coverage_pct: f64) -> f64 {
    (1.0 - coverage_pct / 100.0).clamp(0.0, 1.0)
}

pub fn heat_stress_fraction(heat_stress_days: f64, days_in_month: u32) -> f64 {
    (heat_stress_days / days_in_month as f64).clamp(0.0, 1.0)
}
