/// Spatial/temporal reconciliation: closes the granularity gap between each
/// source and the county-month key before the join.
///
/// - point → county: polygon containment, then nearest centroid within a
///   tolerance, else the sample is dropped
/// - hourly → monthly: bucketing by calendar month (the per-field aggregation
///   itself is fixed by `Field::aggregation`)
/// - annual → monthly: uniform split across the 12 months
/// - time-invariant → monthly: repetition across every month of the window
/// - missing county aggregates: nearest-county borrow
///
/// Nothing here interpolates or extrapolates. Every fallback produces a
/// `RecoveryEvent` and a log line naming the key and the rule.
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use chrono::NaiveDateTime;

use crate::counties::County;
use crate::error::AdapterError;
use crate::geo::{Attribution, CountyBoundaries, GeoPoint};
use crate::model::{
    CountyMonthKey, Field, FieldValue, MissingReason, NormalizedRecord, Provenance,
    ProvenanceTag, ReconciliationRule, SourceId, StudyWindow, YearMonth,
};

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

/// A local recovery performed while reconciling a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryEvent {
    pub source: SourceId,
    pub county: Option<County>,
    pub year_month: Option<YearMonth>,
    #[serde(flatten)]
    pub kind: RecoveryKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryKind {
    /// County had no usable samples for `field`; value taken from `from`
    SoilBorrowed {
        field: Field,
        from: County,
        distance_km: f64,
    },
    /// No county had a value for `field`; left missing
    SoilUnavailable { field: Field },
    MissingRasterFile,
    /// No cell centre inside the polygon; used the cell under the centroid
    CentroidCell,
    NoRasterCoverage,
    SampleSnapped {
        sample_id: String,
        distance_km: f64,
    },
    SampleDropped {
        sample_id: String,
        lat: f64,
        lon: f64,
    },
}

// ---------------------------------------------------------------------------
// Point → county
// ---------------------------------------------------------------------------

/// Anything with a coordinate and an identifier, e.g. a soil sample.
pub trait Located {
    fn id(&self) -> &str;
    fn location(&self) -> GeoPoint;
}

/// Attribute each item to a county. Items outside every polygon snap to the
/// nearest centroid within `tolerance_km`; the rest are dropped and logged.
pub fn assign_to_counties<'a, T: Located>(
    items: &'a [T],
    boundaries: &CountyBoundaries,
    tolerance_km: f64,
    source: SourceId,
) -> (BTreeMap<County, Vec<&'a T>>, Vec<RecoveryEvent>) {
    let mut assigned: BTreeMap<County, Vec<&T>> = BTreeMap::new();
    let mut recoveries = Vec::new();

    for item in items {
        let location = item.location();
        match boundaries.locate(&location, tolerance_km) {
            Some((county, Attribution::Contained)) => {
                assigned.entry(county).or_default().push(item);
            }
            Some((county, Attribution::NearestCentroid { distance_km })) => {
                debug!(
                    sample_id = item.id(),
                    county = %county,
                    distance_km,
                    "Sample outside all polygons, snapped to nearest centroid"
                );
                recoveries.push(RecoveryEvent {
                    source,
                    county: Some(county),
                    year_month: None,
                    kind: RecoveryKind::SampleSnapped {
                        sample_id: item.id().to_string(),
                        distance_km,
                    },
                });
                assigned.entry(county).or_default().push(item);
            }
            None => {
                warn!(
                    sample_id = item.id(),
                    lat = location.lat,
                    lon = location.lon,
                    tolerance_km,
                    "Sample outside all polygons and beyond snap tolerance, dropped"
                );
                recoveries.push(RecoveryEvent {
                    source,
                    county: None,
                    year_month: None,
                    kind: RecoveryKind::SampleDropped {
                        sample_id: item.id().to_string(),
                        lat: location.lat,
                        lon: location.lon,
                    },
                });
            }
        }
    }

    (assigned, recoveries)
}

// ---------------------------------------------------------------------------
// Hourly → monthly
// ---------------------------------------------------------------------------

/// Group timestamped items by calendar month, keeping only months inside the window.
pub fn bucket_by_month<'a, T, F>(
    items: &'a [T],
    window: &StudyWindow,
    timestamp: F,
) -> BTreeMap<YearMonth, Vec<&'a T>>
where
    F: Fn(&T) -> NaiveDateTime,
{
    let mut buckets: BTreeMap<YearMonth, Vec<&T>> = BTreeMap::new();
    let mut outside = 0usize;
    for item in items {
        let year_month = YearMonth::of(timestamp(item).date());
        if window.contains(year_month) {
            buckets.entry(year_month).or_default().push(item);
        } else {
            outside += 1;
        }
    }
    if outside > 0 {
        debug!(outside, "Dropped observations outside the study window");
    }
    buckets
}

// ---------------------------------------------------------------------------
// Annual / time-invariant → monthly
// ---------------------------------------------------------------------------

/// Split annual totals evenly across the 12 months of `year`.
///
/// This is a seasonally unweighted carry-forward, not a forecast: the monthly
/// values are tagged `UniformlyDistributed` so consumers never mistake them
/// for independent monthly measurements. Absent totals stay missing.
pub fn split_annual_uniformly(
    county: County,
    year: i32,
    source: SourceId,
    totals: &[(Field, Option<f64>)],
) -> Vec<NormalizedRecord> {
    let provenance = Provenance::new(
        source,
        ProvenanceTag::UniformlyDistributed,
        ReconciliationRule::UniformAnnualSplit,
    );
    (1..=12)
        .map(|month| {
            let key = CountyMonthKey { county, year, month };
            totals
                .iter()
                .fold(NormalizedRecord::new(key, source), |record, (field, total)| {
                    let value = match total {
                        Some(total) => FieldValue::present(total / 12.0, provenance),
                        None => FieldValue::Missing(MissingReason::NotReported),
                    };
                    record.with(*field, value)
                })
        })
        .collect()
}

/// Repeat a time-invariant set of field values across every month of `months`.
pub fn repeat_time_invariant(
    county: County,
    months: &[YearMonth],
    source: SourceId,
    values: &BTreeMap<Field, FieldValue>,
) -> Vec<NormalizedRecord> {
    months
        .iter()
        .map(|ym| NormalizedRecord {
            key: CountyMonthKey::new(county, *ym),
            source,
            fields: values.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Nearest-county borrow
// ---------------------------------------------------------------------------

/// Fill county aggregates that their primary source could not populate.
///
/// `aggregates` holds, per county, either the county's own per-field values or
/// the `InsufficientSamples` condition. A field a county lacks is borrowed
/// from the nearest county (by centroid) that has its own value for that
/// field; borrowed values are tagged `FallbackBorrowed` with the donor in the
/// rule. Donors are always counties with their own measurement, never other
/// borrowers.
pub fn borrow_from_nearest(
    aggregates: &BTreeMap<County, Result<BTreeMap<Field, f64>, AdapterError>>,
    fields: &[Field],
    boundaries: &CountyBoundaries,
    source: SourceId,
    own_provenance: Provenance,
) -> (BTreeMap<County, BTreeMap<Field, FieldValue>>, Vec<RecoveryEvent>) {
    let own_value = |county: County, field: Field| -> Option<f64> {
        aggregates
            .get(&county)
            .and_then(|r| r.as_ref().ok())
            .and_then(|values| values.get(&field).copied())
    };

    let mut filled = BTreeMap::new();
    let mut recoveries = Vec::new();

    for county in County::ALL {
        if let Some(Err(condition)) = aggregates.get(&county) {
            warn!(county = %county, error = %condition, "Falling back to nearest-county borrow");
        }

        let mut values = BTreeMap::new();
        for field in fields {
            if let Some(value) = own_value(county, *field) {
                values.insert(*field, FieldValue::present(value, own_provenance));
                continue;
            }

            let centroid = boundaries.get(county).map(|b| b.centroid);
            let donor = centroid.and_then(|c| {
                boundaries.nearest_centroid(&c, |candidate| {
                    candidate != county && own_value(candidate, *field).is_some()
                })
            });

            match donor.and_then(|(from, d)| own_value(from, *field).map(|v| (from, d, v))) {
                Some((from, distance_km, value)) => {
                    warn!(
                        county = %county,
                        field = %field,
                        from = %from,
                        distance_km,
                        rule = "nearest_county_borrow",
                        "Borrowed county aggregate from nearest county"
                    );
                    values.insert(
                        *field,
                        FieldValue::present(
                            value,
                            Provenance::new(
                                source,
                                ProvenanceTag::FallbackBorrowed,
                                ReconciliationRule::BorrowedFrom(from),
                            ),
                        ),
                    );
                    recoveries.push(RecoveryEvent {
                        source,
                        county: Some(county),
                        year_month: None,
                        kind: RecoveryKind::SoilBorrowed {
                            field: *field,
                            from,
                            distance_km,
                        },
                    });
                }
                None => {
                    warn!(county = %county, field = %field, "No county has a value to borrow");
                    values.insert(*field, FieldValue::Missing(MissingReason::InsufficientSamples));
                    recoveries.push(RecoveryEvent {
                        source,
                        county: Some(county),
                        year_month: None,
                        kind: RecoveryKind::SoilUnavailable { field: *field },
                    });
                }
            }
        }
        filled.insert(county, values);
    }

    (filled, recoveries)
}
