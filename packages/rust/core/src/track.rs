//! Track construction for one reduced event.
//!
//! The feed usually ships its own LineString alongside the points; when it
//! does, that path is stored verbatim. Otherwise a path is synthesized from
//! the node positions in chronological order.

use tracing::debug;

use stormtrack_shared::{EventMeta, Feature, Node, Polyline, Track};

/// Build the event's track from the newest episode's line features, falling
/// back to the node positions when no usable line is present.
pub fn build_track(lines: &[Feature], nodes: &[Node], meta: &EventMeta) -> Track {
    let path = lines
        .iter()
        .filter_map(|f| f.geometry.as_ref()?.as_polyline().ok())
        .find(|line| !line.is_empty())
        .unwrap_or_else(|| {
            debug!(event_id = meta.event_id, "no line feature, synthesizing track from nodes");
            Polyline(nodes.iter().map(|n| n.position).collect())
        });

    Track {
        event_id: meta.event_id,
        episode_id: meta.episode_id,
        event_name: meta.event_name.clone(),
        timestamp: meta.timestamp,
        path,
    }
}
