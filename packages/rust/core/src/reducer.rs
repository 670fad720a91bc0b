//! Episode reduction: collapse an event's episode history into the newest
//! usable snapshot.
//!
//! The newest episode wins outright. When it cannot be fetched the reducer
//! falls back to the next-newest; when it carries a single point, earlier
//! episodes are walked backwards to recover enough history for a track.
//! Events that still end up with fewer than two points are discarded.

use tracing::{debug, instrument, warn};

use stormtrack_feed::{EpisodeRef, HazardFeed};
use stormtrack_shared::{
    EventMeta, Feature, Node, Result, StormtrackError, feature_timestamp,
};

use crate::classify::{Classified, classify};

/// One event reduced to its canonical snapshot: shared metadata, the
/// chronological node list, and the newest episode's classified features.
#[derive(Debug)]
pub struct ReducedEvent {
    pub meta: EventMeta,
    pub nodes: Vec<Node>,
    pub latest: Classified,
}

/// Reduce an ordered episode list to the event's canonical state.
///
/// Returns `Ok(None)` when the event should be discarded: no point features
/// in the usable newest episode, or fewer than two nodes even after walking
/// earlier episodes. Errors only when no episode can be fetched at all or
/// the seed feature is missing required identity properties.
#[instrument(skip_all, fields(episodes = episodes.len()))]
pub async fn reduce_event<F: HazardFeed>(
    feed: &F,
    episodes: &[EpisodeRef],
) -> Result<Option<ReducedEvent>> {
    if episodes.is_empty() {
        return Err(StormtrackError::validation(
            "event has no episode files to reduce",
        ));
    }

    // Newest episode first; fall back one step at a time on fetch failure.
    let mut newest_idx = episodes.len();
    let mut latest = None;
    let mut last_err = None;
    while newest_idx > 0 {
        let episode = &episodes[newest_idx - 1];
        match feed.fetch_features(&episode.locator).await {
            Ok(collection) => {
                latest = Some(classify(collection));
                break;
            }
            Err(e) => {
                warn!(
                    locator = %episode.locator,
                    error = %e,
                    "newest episode unreadable, trying previous"
                );
                last_err = Some(e);
                newest_idx -= 1;
            }
        }
    }
    let Some(latest) = latest else {
        return Err(last_err.unwrap_or_else(|| {
            StormtrackError::validation("event has no episode files to reduce")
        }));
    };
    let newest = &episodes[newest_idx - 1];

    let Some(seed) = latest.points.first() else {
        debug!(locator = %newest.locator, "no point features, discarding event");
        return Ok(None);
    };
    let meta = seed_meta(seed, newest.sequence)?;

    let mut nodes: Vec<Node> = latest
        .points
        .iter()
        .filter_map(|f| node_from_feature(f, &meta))
        .collect();

    // A one-point episode gives no path; recover earlier positions.
    if nodes.len() == 1 {
        let recovered = walk_back(feed, &episodes[..newest_idx - 1], &meta).await;
        if !recovered.is_empty() {
            debug!(
                event_id = meta.event_id,
                recovered = recovered.len(),
                "recovered nodes from earlier episodes"
            );
            let tail = nodes;
            nodes = recovered;
            nodes.extend(tail);
        }
    }

    if nodes.len() < 2 {
        debug!(
            event_id = meta.event_id,
            nodes = nodes.len(),
            "too few nodes for a track, discarding event"
        );
        return Ok(None);
    }

    Ok(Some(ReducedEvent {
        meta,
        nodes,
        latest,
    }))
}

/// Walk every strictly older episode oldest to newest, taking each one's
/// representative (first) point. Unreadable or pointless episodes are
/// skipped.
async fn walk_back<F: HazardFeed>(
    feed: &F,
    earlier: &[EpisodeRef],
    meta: &EventMeta,
) -> Vec<Node> {
    let mut recovered = Vec::new();
    for episode in earlier {
        let collection = match feed.fetch_features(&episode.locator).await {
            Ok(collection) => collection,
            Err(e) => {
                warn!(locator = %episode.locator, error = %e, "skipping unreadable episode");
                continue;
            }
        };
        let classified = classify(collection);
        if let Some(node) = classified
            .points
            .first()
            .and_then(|f| node_from_feature(f, meta))
        {
            recovered.push(node);
        }
    }
    recovered
}

/// Shared event metadata seeded from the first point of the newest episode.
fn seed_meta(seed: &Feature, newest_sequence: i64) -> Result<EventMeta> {
    let event_id = seed.prop_i64("eventid").ok_or_else(|| {
        StormtrackError::parse("seed feature is missing the eventid property")
    })?;
    let episode_id = seed.prop_i64("episodeid").unwrap_or(newest_sequence);
    let event_name = seed.prop_str("eventname").unwrap_or_default().to_string();
    let timestamp = feature_timestamp(seed).ok_or_else(|| {
        StormtrackError::parse(format!(
            "event {event_id}: seed feature has no readable advisory date"
        ))
    })?;

    Ok(EventMeta {
        event_id,
        event_name,
        episode_id,
        timestamp,
    })
}

/// A node from one point feature, stamped with the event's shared identity.
/// `released_date` prefers the feature's own parseable advisory date and
/// falls back to the shared timestamp. Features with broken geometry are
/// dropped with a warning.
fn node_from_feature(feature: &Feature, meta: &EventMeta) -> Option<Node> {
    let position = match feature.geometry.as_ref()?.as_point() {
        Ok(position) => position,
        Err(e) => {
            warn!(event_id = meta.event_id, error = %e, "dropping node with broken geometry");
            return None;
        }
    };
    Some(Node {
        event_id: meta.event_id,
        episode_id: meta.episode_id,
        event_name: meta.event_name.clone(),
        wind_speed: feature.prop_f64("windspeed").unwrap_or(0.0),
        timestamp: meta.timestamp,
        released_date: feature_timestamp(feature).unwrap_or(meta.timestamp),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubFeed, point_feature, polygon_feature};
    use stormtrack_feed::order_episodes;

    fn episodes(names: &[&str]) -> Vec<EpisodeRef> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        order_episodes(&names)
    }

    #[tokio::test]
    async fn newest_episode_wins() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_1.geojson",
            vec![point_feature(9, 1, "OLD", "2021-07-01T00:00:00", 20.0, 0.0, 0.0)],
        );
        feed.add_episode(
            "/TC/9/",
            "geojson_9_2.geojson",
            vec![
                point_feature(9, 2, "ELSA-21", "2021-07-02T00:00:00", 40.0, 1.0, 1.0),
                point_feature(9, 2, "ELSA-21", "2021-07-02T06:00:00", 45.0, 2.0, 2.0),
            ],
        );

        let eps = episodes(&["geojson_9_1.geojson", "geojson_9_2.geojson"]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();

        assert_eq!(reduced.meta.event_id, 9);
        assert_eq!(reduced.meta.episode_id, 2);
        assert_eq!(reduced.meta.event_name, "ELSA-21");
        assert_eq!(reduced.nodes.len(), 2);
        // Every node carries the newest episode id, not its own.
        assert!(reduced.nodes.iter().all(|n| n.episode_id == 2));
        assert_eq!(reduced.nodes[1].wind_speed, 45.0);
    }

    #[tokio::test]
    async fn falls_back_when_newest_is_unreadable() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_1.geojson",
            vec![
                point_feature(9, 1, "ELSA-21", "2021-07-01T00:00:00", 20.0, 0.0, 0.0),
                point_feature(9, 1, "ELSA-21", "2021-07-01T06:00:00", 25.0, 0.5, 0.5),
            ],
        );
        feed.add_episode("/TC/9/", "geojson_9_2.geojson", vec![]);
        feed.fail("geojson_9_2.geojson");

        let eps = episodes(&["geojson_9_1.geojson", "geojson_9_2.geojson"]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();
        assert_eq!(reduced.meta.episode_id, 1);
        assert_eq!(reduced.nodes.len(), 2);
    }

    #[tokio::test]
    async fn all_episodes_unreadable_is_an_error() {
        let mut feed = StubFeed::new();
        feed.add_episode("/TC/9/", "geojson_9_1.geojson", vec![]);
        feed.fail("geojson_9_1.geojson");

        let eps = episodes(&["geojson_9_1.geojson"]);
        assert!(reduce_event(&feed, &eps).await.is_err());
    }

    #[tokio::test]
    async fn empty_episode_list_is_an_error() {
        let feed = StubFeed::new();
        assert!(reduce_event(&feed, &[]).await.is_err());
    }

    #[tokio::test]
    async fn single_point_newest_walks_back() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_1.geojson",
            vec![point_feature(9, 1, "ELSA-21", "2021-07-01T00:00:00", 20.0, 0.0, 0.0)],
        );
        feed.add_episode(
            "/TC/9/",
            "geojson_9_2.geojson",
            vec![point_feature(9, 2, "ELSA-21", "2021-07-02T00:00:00", 40.0, 2.0, 2.0)],
        );

        let eps = episodes(&["geojson_9_1.geojson", "geojson_9_2.geojson"]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();

        assert_eq!(reduced.nodes.len(), 2);
        // Recovered node comes first and is stamped with the newest episode.
        assert_eq!(reduced.nodes[0].position.lon, 0.0);
        assert_eq!(reduced.nodes[0].episode_id, 2);
        assert_eq!(reduced.nodes[1].position.lon, 2.0);
    }

    #[tokio::test]
    async fn walk_back_recovers_full_history() {
        let mut feed = StubFeed::new();
        for (seq, lon) in [(1, 0.0), (2, 1.0), (3, 2.0), (4, 3.0)] {
            feed.add_episode(
                "/TC/9/",
                &format!("geojson_9_{seq}.geojson"),
                vec![point_feature(
                    9,
                    seq,
                    "ELSA-21",
                    &format!("2021-07-0{seq}T00:00:00"),
                    20.0,
                    lon,
                    lon,
                )],
            );
        }

        let eps = episodes(&[
            "geojson_9_1.geojson",
            "geojson_9_2.geojson",
            "geojson_9_3.geojson",
            "geojson_9_4.geojson",
        ]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();

        let lons: Vec<f64> = reduced.nodes.iter().map(|n| n.position.lon).collect();
        assert_eq!(lons, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(reduced.nodes.iter().all(|n| n.episode_id == 4));
    }

    #[tokio::test]
    async fn walk_back_skips_unreadable_episodes() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_1.geojson",
            vec![point_feature(9, 1, "ELSA-21", "2021-07-01T00:00:00", 20.0, 0.0, 0.0)],
        );
        feed.add_episode("/TC/9/", "geojson_9_2.geojson", vec![]);
        feed.fail("geojson_9_2.geojson");
        feed.add_episode(
            "/TC/9/",
            "geojson_9_3.geojson",
            vec![point_feature(9, 3, "ELSA-21", "2021-07-03T00:00:00", 50.0, 3.0, 3.0)],
        );

        let eps = episodes(&[
            "geojson_9_1.geojson",
            "geojson_9_2.geojson",
            "geojson_9_3.geojson",
        ]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();
        assert_eq!(reduced.nodes.len(), 2);
        assert_eq!(reduced.nodes[0].position.lon, 0.0);
    }

    #[tokio::test]
    async fn lone_point_event_is_discarded() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_1.geojson",
            vec![point_feature(9, 1, "ELSA-21", "2021-07-01T00:00:00", 20.0, 0.0, 0.0)],
        );

        let eps = episodes(&["geojson_9_1.geojson"]);
        assert!(reduce_event(&feed, &eps).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pointless_newest_episode_is_discarded() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_1.geojson",
            vec![polygon_feature("Poly_Red", "Hurricane force")],
        );

        let eps = episodes(&["geojson_9_1.geojson"]);
        assert!(reduce_event(&feed, &eps).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn released_date_prefers_the_nodes_own_date() {
        let mut feed = StubFeed::new();
        feed.add_episode(
            "/TC/9/",
            "geojson_9_2.geojson",
            vec![
                point_feature(9, 2, "ELSA-21", "2021-07-02T00:00:00", 40.0, 0.0, 0.0),
                point_feature(9, 2, "ELSA-21", "2021-07-02T06:00:00", 45.0, 1.0, 1.0),
            ],
        );

        let eps = episodes(&["geojson_9_2.geojson"]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();

        // The shared timestamp comes from the seed; each node's own advisory
        // date lands in released_date.
        assert_eq!(
            reduced.meta.timestamp.to_rfc3339(),
            "2021-07-02T00:00:00+00:00"
        );
        assert!(reduced.nodes.iter().all(|n| n.timestamp == reduced.meta.timestamp));
        assert_eq!(
            reduced.nodes[1].released_date.to_rfc3339(),
            "2021-07-02T06:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn released_date_falls_back_to_shared_timestamp() {
        let mut feed = StubFeed::new();
        let mut dateless =
            point_feature(9, 2, "ELSA-21", "2021-07-02T00:00:00", 40.0, 1.0, 1.0);
        dateless
            .properties
            .as_mut()
            .unwrap()
            .remove("todate");
        feed.add_episode(
            "/TC/9/",
            "geojson_9_2.geojson",
            vec![
                point_feature(9, 2, "ELSA-21", "2021-07-02T00:00:00", 40.0, 0.0, 0.0),
                dateless,
            ],
        );

        let eps = episodes(&["geojson_9_2.geojson"]);
        let reduced = reduce_event(&feed, &eps).await.unwrap().unwrap();
        assert_eq!(reduced.nodes[1].released_date, reduced.meta.timestamp);
    }
}
