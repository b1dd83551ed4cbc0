/// Composite score engine.
///
/// Each index is `100 × Σ wᵢ·featureᵢ + 100 × w_geo·adjustment`, clamped to
/// `[0, 100]`. Features carrying a zero weight are not read, so they may be
/// missing without affecting the index.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::config::calibration::{IndexWeightTable, IndexWeights};
use crate::counties::GeoAdjustments;
use crate::error::MissingInput;
use crate::features::DerivedFeatures;
use crate::model::CountyMonthKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    WaterScarcity,
    AgriculturalRisk,
    IrrigationPriority,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [
        IndexKind::WaterScarcity,
        IndexKind::AgriculturalRisk,
        IndexKind::IrrigationPriority,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            IndexKind::WaterScarcity => "water_scarcity_score",
            IndexKind::AgriculturalRisk => "agricultural_risk_index",
            IndexKind::IrrigationPriority => "irrigation_priority_score",
        }
    }

    pub fn weights<'a>(&self, table: &'a IndexWeightTable) -> &'a IndexWeights {
        match self {
            IndexKind::WaterScarcity => &table.water_scarcity,
            IndexKind::AgriculturalRisk => &table.agricultural_risk,
            IndexKind::IrrigationPriority => &table.irrigation_priority,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Clamp {
    Below,
    Above,
}

/// A bounded score and whether reaching the bounds required clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub value: f64,
    pub clamped: Option<Clamp>,
}

impl Score {
    /// Clamp `raw` into `[0, 100]`. NaN clamps to the lower bound.
    pub fn from_raw(raw: f64) -> Self {
        if raw.is_nan() || raw < 0.0 {
            Score {
                value: 0.0,
                clamped: Some(Clamp::Below),
            }
        } else if raw > 100.0 {
            Score {
                value: 100.0,
                clamped: Some(Clamp::Above),
            }
        } else {
            Score {
                value: raw,
                clamped: None,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScores {
    pub key: CountyMonthKey,
    pub water_scarcity: Result<Score, MissingInput>,
    pub agricultural_risk: Result<Score, MissingInput>,
    pub irrigation_priority: Result<Score, MissingInput>,
}

impl CompositeScores {
    pub fn get(&self, kind: IndexKind) -> Result<Score, MissingInput> {
        match kind {
            IndexKind::WaterScarcity => self.water_scarcity,
            IndexKind::AgriculturalRisk => self.agricultural_risk,
            IndexKind::IrrigationPriority => self.irrigation_priority,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClampCounts {
    pub below: usize,
    pub above: usize,
}

/// Scores for every key plus per-index clamping statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSet {
    pub scores: Vec<CompositeScores>,
    pub clamps: BTreeMap<IndexKind, ClampCounts>,
}

/// Score a single index. Any non-zero-weighted missing feature makes the
/// whole index missing.
pub fn score_index(
    features: &DerivedFeatures,
    adjustment: f64,
    weights: &IndexWeights,
) -> Result<Score, MissingInput> {
    let terms = [
        (weights.water_stress, features.water_stress),
        (weights.temperature_stress, features.temperature_stress),
        (weights.soil_ph_risk, features.soil_ph_risk),
        (weights.yield_gap, features.yield_gap),
        (weights.irrigation_gap, features.irrigation_gap),
        (weights.heat_stress_fraction, features.heat_stress_fraction),
    ];

    let mut weighted = 0.0;
    for (weight, feature) in terms {
        if weight == 0.0 {
            continue;
        }
        weighted += weight * feature?;
    }
    let raw = 100.0 * weighted + 100.0 * weights.geographic_adjustment * adjustment;
    if raw.is_nan() {
        warn!(key = %features.key, "Composite score is not a number");
    }
    Ok(Score::from_raw(raw))
}

pub fn score_record(
    features: &DerivedFeatures,
    adjustments: &GeoAdjustments,
    table: &IndexWeightTable,
) -> CompositeScores {
    let adjustment = adjustments.get(features.key.county);
    let score = |kind: IndexKind| score_index(features, adjustment, kind.weights(table));
    CompositeScores {
        key: features.key,
        water_scarcity: score(IndexKind::WaterScarcity),
        agricultural_risk: score(IndexKind::AgriculturalRisk),
        irrigation_priority: score(IndexKind::IrrigationPriority),
    }
}

#[instrument(skip_all, fields(records = features.len()))]
pub fn score_all(
    features: &[DerivedFeatures],
    adjustments: &GeoAdjustments,
    table: &IndexWeightTable,
) -> ScoreSet {
    let mut clamps: BTreeMap<IndexKind, ClampCounts> =
        IndexKind::ALL.iter().map(|k| (*k, ClampCounts::default())).collect();

    let scores: Vec<CompositeScores> = features
        .iter()
        .map(|f| score_record(f, adjustments, table))
        .collect();

    for record in &scores {
        for kind in IndexKind::ALL {
            if let Ok(Score {
                clamped: Some(clamp),
                ..
            }) = record.get(kind)
            {
                let counts = clamps.entry(kind).or_default();
                match clamp {
                    Clamp::Below => counts.below += 1,
                    Clamp::Above => counts.above += 1,
                }
                debug!(key = %record.key, index = %kind, ?clamp, "Score clamped");
            }
        }
    }

    ScoreSet { scores, clamps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counties::County;
    use crate::model::{Field, YearMonth};

    fn features(value: f64) -> DerivedFeatures {
        DerivedFeatures {
            key: CountyMonthKey::new(County::Kitui, YearMonth::new(2020, 2).unwrap()),
            evapotranspiration_mm: Ok(100.0),
            water_balance_mm: Ok(-20.0),
            water_stress: Ok(value),
            temperature_stress: Ok(value),
            soil_ph_risk: Ok(value),
            irrigation_needed: Ok(true),
            irrigation_volume_l_ha: Ok(200_000.0),
            yield_t_ha: Ok(1.0),
            yield_gap: Ok(value),
            irrigation_gap: Ok(value),
            heat_stress_fraction: Ok(value),
        }
    }

    #[test]
    fn test_uniform_features_score_linearly() {
        let table = IndexWeightTable::default();
        let weights = IndexKind::WaterScarcity.weights(&table);
        // 100 × 0.85 × 0.5 + 100 × 0.15 × 0.2 = 45.5
        let score = score_index(&features(0.5), 0.2, weights).unwrap();
        assert!((score.value - 45.5).abs() < 1e-9);
        assert_eq!(score.clamped, None);
    }

    #[test]
    fn test_negative_adjustment_clamps_below() {
        let table = IndexWeightTable::default();
        let score = score_index(&features(0.0), -1.0, &table.irrigation_priority).unwrap();
        assert_eq!(score.value, 0.0);
        assert_eq!(score.clamped, Some(Clamp::Below));
    }

    #[test]
    fn test_missing_weighted_feature_makes_score_missing() {
        let table = IndexWeightTable::default();
        let mut f = features(0.5);
        let missing = MissingInput {
            key: f.key,
            field: Field::MaizeArea,
        };
        f.yield_gap = Err(missing);

        let scores = score_record(&f, &GeoAdjustments::builtin(), &table);
        assert_eq!(scores.agricultural_risk, Err(missing));
        // Yield gap carries no weight in the other two indices
        assert!(scores.water_scarcity.is_ok());
        assert!(scores.irrigation_priority.is_ok());
    }

    #[test]
    fn test_score_all_counts_clamps() {
        let table = IndexWeightTable::default();
        let adjustments = GeoAdjustments::from_values(
            County::ALL.iter().map(|c| (*c, -1.0)).collect(),
        )
        .unwrap();
        let set = score_all(&[features(0.0), features(0.5)], &adjustments, &table);

        assert_eq!(set.scores.len(), 2);
        assert_eq!(set.clamps[&IndexKind::WaterScarcity].below, 1);
        assert_eq!(set.clamps[&IndexKind::WaterScarcity].above, 0);
    }

    #[test]
    fn test_non_finite_raw_scores_stay_in_bounds() {
        let nan = Score::from_raw(f64::NAN);
        assert_eq!(nan.value, 0.0);
        assert_eq!(nan.clamped, Some(Clamp::Below));
        assert_eq!(Score::from_raw(f64::INFINITY).value, 100.0);
        assert_eq!(Score::from_raw(f64::NEG_INFINITY).value, 0.0);

        let table = IndexWeightTable::default();
        let score = score_index(&features(f64::NAN), 0.0, &table.water_scarcity).unwrap();
        assert!((0.0..=100.0).contains(&score.value));
    }
}
