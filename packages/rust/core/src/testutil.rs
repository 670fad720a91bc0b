//! In-memory feed and sink doubles plus feature builders for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::json;

use stormtrack_feed::HazardFeed;
use stormtrack_shared::{
    EventMeta, Feature, FeatureCollection, Result, StormtrackError, parse_advisory_date,
};

use crate::sink::{EventSink, EventState};

pub fn meta(event_id: i64, episode_id: i64, name: &str, date: &str) -> EventMeta {
    EventMeta {
        event_id,
        event_name: name.into(),
        episode_id,
        timestamp: parse_advisory_date(date).expect("valid test date"),
    }
}

pub fn point_feature(
    eventid: i64,
    episodeid: i64,
    name: &str,
    date: &str,
    windspeed: f64,
    lon: f64,
    lat: f64,
) -> Feature {
    serde_json::from_value(json!({
        "geometry": {"type": "Point", "coordinates": [lon, lat]},
        "properties": {
            "eventid": eventid,
            "episodeid": episodeid,
            "eventname": name,
            "todate": date,
            "windspeed": windspeed
        }
    }))
    .expect("valid test feature")
}

pub fn line_feature(coords: &[(f64, f64)]) -> Feature {
    let coordinates: Vec<[f64; 2]> = coords.iter().map(|(lon, lat)| [*lon, *lat]).collect();
    serde_json::from_value(json!({
        "geometry": {"type": "LineString", "coordinates": coordinates},
        "properties": {}
    }))
    .expect("valid test feature")
}

pub fn polygon_feature(class: &str, label: &str) -> Feature {
    serde_json::from_value(json!({
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [2.0, 0.0], [1.0, 2.0], [0.0, 0.0]]]
        },
        "properties": {"Class": class, "polygonlabel": label}
    }))
    .expect("valid test feature")
}

/// Scripted feed: event paths, per-event listings, per-locator snapshots.
/// Any locator in `failing` errors out.
#[derive(Default)]
pub struct StubFeed {
    pub events: Vec<String>,
    pub listings: HashMap<String, Vec<String>>,
    pub snapshots: HashMap<String, FeatureCollection>,
    pub failing: HashSet<String>,
}

impl StubFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an episode file under an event, with its snapshot.
    pub fn add_episode(&mut self, event_path: &str, locator: &str, features: Vec<Feature>) {
        if !self.events.contains(&event_path.to_string()) {
            self.events.push(event_path.to_string());
        }
        self.listings
            .entry(event_path.to_string())
            .or_default()
            .push(locator.to_string());
        self.snapshots
            .insert(locator.to_string(), FeatureCollection { features });
    }

    pub fn fail(&mut self, locator: &str) {
        self.failing.insert(locator.to_string());
    }
}

impl HazardFeed for StubFeed {
    async fn list_events(&self) -> Result<Vec<String>> {
        Ok(self.events.clone())
    }

    async fn list_episode_files(&self, event_path: &str) -> Result<Vec<String>> {
        if self.failing.contains(event_path) {
            return Err(StormtrackError::Network(format!(
                "stub failure for {event_path}"
            )));
        }
        self.listings
            .get(event_path)
            .cloned()
            .ok_or_else(|| StormtrackError::Network(format!("unknown event {event_path}")))
    }

    async fn fetch_features(&self, locator: &str) -> Result<FeatureCollection> {
        if self.failing.contains(locator) {
            return Err(StormtrackError::Network(format!(
                "stub failure for {locator}"
            )));
        }
        self.snapshots
            .get(locator)
            .cloned()
            .ok_or_else(|| StormtrackError::Network(format!("unknown locator {locator}")))
    }

    fn event_locator(&self, event_id: i64) -> String {
        format!("/TC/{event_id}/")
    }
}

/// Sink double that records every replace and keeps an in-memory cursor.
#[derive(Default)]
pub struct RecordingSink {
    pub cursors: Mutex<HashMap<i64, i64>>,
    pub replaced: Mutex<Vec<EventState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_count(&self) -> usize {
        self.replaced.lock().unwrap().len()
    }

    /// Pre-seed the cursor, as if the event were stored at this episode.
    pub fn seed_cursor(&self, event_id: i64, episode_id: i64) {
        self.cursors.lock().unwrap().insert(event_id, episode_id);
    }
}

impl EventSink for RecordingSink {
    async fn last_stored_episode(&self, event_id: i64) -> Result<Option<i64>> {
        Ok(self.cursors.lock().unwrap().get(&event_id).copied())
    }

    async fn replace_event(&self, state: &EventState) -> Result<()> {
        self.cursors
            .lock()
            .unwrap()
            .insert(state.meta.event_id, state.meta.episode_id);
        self.replaced.lock().unwrap().push(state.clone());
        Ok(())
    }
}
