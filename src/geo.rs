/// County polygons and the geometric primitives the reconciler needs:
/// point-in-polygon, haversine distance, nearest centroid.
///
/// Boundaries are read from a small JSON document. Coordinates follow the
/// GeoJSON convention of `[longitude, latitude]`:
///
/// ```json
/// { "counties": [
///     { "county": "Nakuru", "centroid": [36.07, -0.30],
///       "rings": [[[35.6, -0.9], [36.6, -0.9], [36.6, 0.3], [35.6, 0.3]]] }
/// ] }
/// ```
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::counties::County;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundaryError {
    #[error("No boundary for county {0}")]
    MissingCounty(County),

    #[error("Duplicate boundary for county {0}")]
    DuplicateCounty(County),

    #[error("Boundary for {0} has no ring with at least 3 vertices")]
    DegeneratePolygon(County),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct BoundaryDocument {
    counties: Vec<RawBoundary>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct RawBoundary {
    county: String,
    centroid: [f64; 2],
    rings: Vec<Vec<[f64; 2]>>,
}

/// Polygon outline of one county. Rings are combined with the even-odd rule,
/// so holes and multi-part counties are both expressed as extra rings.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyBoundary {
    pub county: County,
    pub centroid: GeoPoint,
    pub rings: Vec<Vec<GeoPoint>>,
}

impl CountyBoundary {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        let mut inside = false;
        for ring in &self.rings {
            if ring_contains(ring, point) {
                inside = !inside;
            }
        }
        inside
    }
}

/// Ray casting along the latitude line through `point`.
fn ring_contains(ring: &[GeoPoint], point: &GeoPoint) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (&ring[i], &ring[j]);
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let crossing_lon = (b.lon - a.lon) * (point.lat - a.lat) / (b.lat - a.lat) + a.lon;
            if point.lon < crossing_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// How a coordinate was attributed to a county.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    Contained,
    NearestCentroid { distance_km: f64 },
}

/// Boundaries for all twenty counties, in county order.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyBoundaries {
    boundaries: BTreeMap<County, CountyBoundary>,
}

impl CountyBoundaries {
    /// Requires exactly one non-degenerate boundary per county.
    pub fn new(boundaries: Vec<CountyBoundary>) -> Result<Self, BoundaryError> {
        let mut by_county = BTreeMap::new();
        for boundary in boundaries {
            if !boundary.rings.iter().any(|r| r.len() >= 3) {
                return Err(BoundaryError::DegeneratePolygon(boundary.county));
            }
            let county = boundary.county;
            if by_county.insert(county, boundary).is_some() {
                return Err(BoundaryError::DuplicateCounty(county));
            }
        }
        if let Some(missing) = County::ALL.iter().find(|c| !by_county.contains_key(c)) {
            return Err(BoundaryError::MissingCounty(*missing));
        }
        Ok(Self {
            boundaries: by_county,
        })
    }

    pub fn get(&self, county: County) -> Option<&CountyBoundary> {
        self.boundaries.get(&county)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountyBoundary> {
        self.boundaries.values()
    }

    /// First county (in enumeration order) whose polygon contains the point.
    pub fn containing(&self, point: &GeoPoint) -> Option<County> {
        self.iter().find(|b| b.contains(point)).map(|b| b.county)
    }

    /// Polygon containment first, then nearest centroid within `tolerance_km`.
    pub fn locate(&self, point: &GeoPoint, tolerance_km: f64) -> Option<(County, Attribution)> {
        if let Some(county) = self.containing(point) {
            return Some((county, Attribution::Contained));
        }
        self.nearest_centroid(point, |_| true)
            .filter(|(_, distance_km)| *distance_km <= tolerance_km)
            .map(|(county, distance_km)| (county, Attribution::NearestCentroid { distance_km }))
    }

    /// Nearest centroid among counties accepted by `eligible`. Ties go to the
    /// county that comes first in enumeration order.
    pub fn nearest_centroid<F>(&self, point: &GeoPoint, eligible: F) -> Option<(County, f64)>
    where
        F: Fn(County) -> bool,
    {
        let mut best: Option<(County, f64)> = None;
        for boundary in self.iter().filter(|b| eligible(b.county)) {
            let distance = boundary.centroid.haversine_km(point);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((boundary.county, distance)),
            }
        }
        best
    }
}

/// Parse the boundary JSON document.
pub fn parse_boundaries(raw: &str) -> Result<Vec<CountyBoundary>, BoundaryParseError> {
    let document: BoundaryDocument = serde_json::from_str(raw)?;
    document
        .counties
        .into_iter()
        .map(|raw| {
            let county = raw.county.parse::<County>()?;
            Ok(CountyBoundary {
                county,
                centroid: GeoPoint::new(raw.centroid[1], raw.centroid[0]),
                rings: raw
                    .rings
                    .into_iter()
                    .map(|ring| ring.into_iter().map(|[lon, lat]| GeoPoint::new(lat, lon)).collect())
                    .collect(),
            })
        })
        .collect()
}

#[derive(Error, Debug)]
pub enum BoundaryParseError {
    #[error("Invalid boundary JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownCounty(#[from] crate::counties::UnknownCounty),
}
