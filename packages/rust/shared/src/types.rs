//! Core domain types for cyclone advisory ingestion.
//!
//! These are plain value records; storage mapping lives entirely inside the
//! sink implementation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, PolygonGeom, Polyline};
use crate::geojson::Feature;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Hazard severity classes carried by impact polygons.
///
/// The feed tags polygons with a `Class` property; only these four classes
/// are ingested, everything else is dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Green,
    Orange,
    Red,
    Cones,
}

impl Severity {
    /// Map a feed `Class` value to a severity; `None` means the polygon is
    /// outside the allow-list.
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "Poly_Green" => Some(Self::Green),
            "Poly_Orange" => Some(Self::Orange),
            "Poly_Red" => Some(Self::Red),
            "Poly_Cones" => Some(Self::Cones),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Orange => "orange",
            Self::Red => "red",
            Self::Cones => "cones",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::error::StormtrackError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "green" => Ok(Self::Green),
            "orange" => Ok(Self::Orange),
            "red" => Ok(Self::Red),
            "cones" => Ok(Self::Cones),
            other => Err(crate::error::StormtrackError::parse(format!(
                "unknown severity {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// Shared identity and primary timestamp for one reconciled event, seeded
/// from the newest episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event_id: i64,
    pub event_name: String,
    /// Newest episode observed; every row written for the event carries it.
    pub episode_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// A single point observation within an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub event_id: i64,
    pub episode_id: i64,
    pub event_name: String,
    pub wind_speed: f64,
    pub timestamp: DateTime<Utc>,
    pub released_date: DateTime<Utc>,
    pub position: GeoPoint,
}

/// A hazard-severity polygon associated with an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub event_id: i64,
    pub episode_id: i64,
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Free-text label from the feed (`polygonlabel`), kept verbatim.
    pub label: String,
    pub boundary: PolygonGeom,
}

/// Ordered polyline connecting an event's nodes chronologically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub event_id: i64,
    pub episode_id: i64,
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    pub path: Polyline,
}

/// An incremental-mode notification: this episode is available for this event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeNotice {
    pub event_id: i64,
    pub episode_id: i64,
}

// ---------------------------------------------------------------------------
// Advisory dates
// ---------------------------------------------------------------------------

/// Property keys that may carry the advisory timestamp, in precedence order.
const TIMESTAMP_KEYS: [&str; 4] = ["todate", "jrc_pubdate", "fromdate", "trackdate"];

/// Parse one of the date formats the feed is known to emit. Naive values are
/// taken as UTC. Returns `None` for anything unrecognized; callers apply
/// their documented fallback.
pub fn parse_advisory_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d %b %Y") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }

    None
}

/// The feature's own advisory timestamp: first timestamp key present whose
/// value parses.
pub fn feature_timestamp(feature: &Feature) -> Option<DateTime<Utc>> {
    TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| feature.prop_str(key))
        .find_map(parse_advisory_date)
}
