/// Per-county roll-up of a completed run, for reporting collaborators.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::counties::{ClimateZone, County};
use crate::pipeline::CountyMonthRow;
use crate::scoring::IndexKind;

/// Agricultural risk band of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            RiskLevel::High
        } else if score > 50.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub months_scored: usize,
    pub mean: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountySummary {
    pub county: County,
    pub climate_zone: ClimateZone,
    pub indices: BTreeMap<IndexKind, IndexSummary>,
    pub months_needing_irrigation: usize,
    pub risk_level: Option<RiskLevel>,
    /// Mean water scarcity or mean agricultural risk above 70
    pub vulnerable: bool,
}

pub fn summarize(rows: &[CountyMonthRow]) -> Vec<CountySummary> {
    let mut by_county: BTreeMap<County, Vec<&CountyMonthRow>> = BTreeMap::new();
    for row in rows {
        by_county.entry(row.key().county).or_default().push(row);
    }

    by_county
        .into_iter()
        .map(|(county, rows)| {
            let indices: BTreeMap<IndexKind, IndexSummary> = IndexKind::ALL
                .iter()
                .map(|kind| {
                    let values: Vec<f64> = rows
                        .iter()
                        .filter_map(|r| r.scores.get(*kind).ok().map(|s| s.value))
                        .collect();
                    let summary = IndexSummary {
                        months_scored: values.len(),
                        mean: (!values.is_empty())
                            .then(|| values.iter().sum::<f64>() / values.len() as f64),
                        max: values.iter().copied().reduce(f64::max),
                    };
                    (*kind, summary)
                })
                .collect();

            let mean = |kind: IndexKind| indices.get(&kind).and_then(|s| s.mean);
            let risk_level = mean(IndexKind::AgriculturalRisk).map(RiskLevel::from_score);
            let vulnerable = mean(IndexKind::WaterScarcity).is_some_and(|m| m > 70.0)
                || mean(IndexKind::AgriculturalRisk).is_some_and(|m| m > 70.0);

            CountySummary {
                county,
                climate_zone: county.climate_zone(),
                months_needing_irrigation: rows
                    .iter()
                    .filter(|r| r.features.irrigation_needed == Ok(true))
                    .count(),
                risk_level,
                vulnerable,
                indices,
            }
        })
        .collect()
}
