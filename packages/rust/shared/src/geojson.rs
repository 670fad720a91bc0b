//! Serde model of the feature collections returned by the feed collaborator.
//!
//! This is the only wire shape the core imposes on upstream: a GeoJSON-style
//! `FeatureCollection` of features with a typed geometry and free-form
//! properties. Geometry kinds outside Point/LineString/Polygon deserialize to
//! [`Geometry::Unsupported`] and are ignored downstream, never raised.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StormtrackError};
use crate::geo::{GeoPoint, PolygonGeom, Polyline};

/// A parsed advisory snapshot: the list of features for one episode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// One feature: geometry plus advisory properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Missing or null geometries are tolerated; such features are dropped
    /// by the classifier.
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    fn props(&self) -> Option<&Map<String, Value>> {
        self.properties.as_ref()
    }

    /// String property, if present and a string.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props()?.get(key)?.as_str()
    }

    /// Numeric property; numeric strings are accepted too, since the feed
    /// is inconsistent about quoting.
    pub fn prop_f64(&self, key: &str) -> Option<f64> {
        match self.props()?.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer property; numeric strings are accepted too.
    pub fn prop_i64(&self, key: &str) -> Option<i64> {
        match self.props()?.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// GeoJSON geometry, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Vec<f64> },
    LineString { coordinates: Vec<Vec<f64>> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    /// Any other geometry kind (MultiPolygon, GeometryCollection, ...).
    #[serde(other)]
    Unsupported,
}

impl Geometry {
    /// Convert a Point geometry to a [`GeoPoint`].
    pub fn as_point(&self) -> Result<GeoPoint> {
        match self {
            Geometry::Point { coordinates } => position(coordinates),
            other => Err(StormtrackError::parse(format!(
                "expected Point geometry, got {}",
                other.kind()
            ))),
        }
    }

    /// Convert a LineString geometry to a [`Polyline`].
    pub fn as_polyline(&self) -> Result<Polyline> {
        match self {
            Geometry::LineString { coordinates } => {
                let points = coordinates
                    .iter()
                    .map(|c| position(c))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Polyline(points))
            }
            other => Err(StormtrackError::parse(format!(
                "expected LineString geometry, got {}",
                other.kind()
            ))),
        }
    }

    /// Convert a Polygon geometry to a [`PolygonGeom`].
    pub fn as_polygon(&self) -> Result<PolygonGeom> {
        match self {
            Geometry::Polygon { coordinates } => {
                let rings = coordinates
                    .iter()
                    .map(|ring| ring.iter().map(|c| position(c)).collect::<Result<Vec<_>>>())
                    .collect::<Result<Vec<_>>>()?;
                Ok(PolygonGeom { rings })
            }
            other => Err(StormtrackError::parse(format!(
                "expected Polygon geometry, got {}",
                other.kind()
            ))),
        }
    }

    /// Geometry kind name, for classification and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::Unsupported => "Unsupported",
        }
    }
}

/// A raw coordinate tuple must carry at least lon and lat; altitude and
/// anything beyond is discarded.
fn position(raw: &[f64]) -> Result<GeoPoint> {
    match raw {
        [lon, lat, ..] => Ok(GeoPoint::new(*lon, *lat)),
        _ => Err(StormtrackError::parse(format!(
            "coordinate tuple has {} elements, need 2",
            raw.len()
        ))),
    }
}
