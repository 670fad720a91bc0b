//! Feature classification for one advisory snapshot.
//!
//! Splits a feature collection into points, lines, and hazard polygons.
//! Polygons outside the severity allow-list and unsupported geometry kinds
//! are dropped silently; neither is an error condition.

use tracing::debug;

use stormtrack_shared::{Buffer, EventMeta, Feature, FeatureCollection, Geometry, Severity};

/// A snapshot's features partitioned by geometry kind.
#[derive(Debug, Default)]
pub struct Classified {
    pub points: Vec<Feature>,
    pub lines: Vec<Feature>,
    /// Hazard polygons that passed the severity allow-list.
    pub polygons: Vec<(Severity, Feature)>,
}

/// Partition a feature collection by geometry kind.
pub fn classify(collection: FeatureCollection) -> Classified {
    let mut out = Classified::default();
    let mut dropped = 0usize;

    for feature in collection.features {
        match &feature.geometry {
            Some(Geometry::Point { .. }) => out.points.push(feature),
            Some(Geometry::LineString { .. }) => out.lines.push(feature),
            Some(Geometry::Polygon { .. }) => {
                let severity = feature
                    .prop_str("Class")
                    .and_then(Severity::from_class);
                match severity {
                    Some(severity) => out.polygons.push((severity, feature)),
                    None => dropped += 1,
                }
            }
            Some(Geometry::Unsupported) | None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "features outside the supported set were ignored");
    }
    out
}

/// Build buffer records from classified hazard polygons, sharing the event's
/// metadata. A polygon whose boundary fails to parse is dropped, not raised.
pub fn build_buffers(polygons: &[(Severity, Feature)], meta: &EventMeta) -> Vec<Buffer> {
    polygons
        .iter()
        .filter_map(|(severity, feature)| {
            let geometry = feature.geometry.as_ref()?;
            let boundary = match geometry.as_polygon() {
                Ok(boundary) => boundary,
                Err(e) => {
                    tracing::warn!(event_id = meta.event_id, error = %e, "dropping malformed buffer polygon");
                    return None;
                }
            };
            Some(Buffer {
                event_id: meta.event_id,
                episode_id: meta.episode_id,
                event_name: meta.event_name.clone(),
                timestamp: meta.timestamp,
                severity: *severity,
                label: feature.prop_str("polygonlabel").unwrap_or_default().to_string(),
                boundary,
            })
        })
        .collect()
}
