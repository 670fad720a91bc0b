//! Minimal WGS84 geometry values and their WKT rendering.
//!
//! The store keeps shapes as WKT text columns, so these types only need to
//! carry coordinates and print themselves; no spatial operations are done
//! in-process.

use serde::{Deserialize, Serialize};

/// A single lon/lat position (WGS84 / SRID 4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Render as `POINT (lon lat)`.
    pub fn to_wkt(&self) -> String {
        format!("POINT ({} {})", self.lon, self.lat)
    }
}

/// An ordered polyline of positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline(pub Vec<GeoPoint>);

impl Polyline {
    /// Render as `LINESTRING (lon lat, ...)`.
    pub fn to_wkt(&self) -> String {
        format!("LINESTRING ({})", coord_list(&self.0))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A polygon as an exterior ring plus optional interior rings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeom {
    pub rings: Vec<Vec<GeoPoint>>,
}

impl PolygonGeom {
    /// Render as `POLYGON ((lon lat, ...), ...)`.
    pub fn to_wkt(&self) -> String {
        let rings: Vec<String> = self
            .rings
            .iter()
            .map(|ring| format!("({})", coord_list(ring)))
            .collect();
        format!("POLYGON ({})", rings.join(", "))
    }
}

fn coord_list(points: &[GeoPoint]) -> String {
    points
        .iter()
        .map(|p| format!("{} {}", p.lon, p.lat))
        .collect::<Vec<_>>()
        .join(", ")
}
