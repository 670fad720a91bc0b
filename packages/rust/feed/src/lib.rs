//! Feed collaborator: event enumeration and advisory snapshot fetching.
//!
//! The core pipeline only consumes the [`HazardFeed`] trait, so fetch/retry
//! mechanics stay at the edge and tests can drive the reducer with an
//! in-memory feed. [`GdacsClient`] is the HTTP implementation for the
//! GDACS-style directory-of-geojson layout.

mod http;
mod listing;

use std::future::Future;

use stormtrack_shared::{FeatureCollection, Result};

pub use http::GdacsClient;
pub use listing::{EpisodeRef, episode_sequence, event_id_from_path, order_episodes};

/// Upstream contract consumed by the core.
///
/// Implementations return raw listings and parsed feature collections; all
/// ordering and reduction semantics live downstream.
pub trait HazardFeed: Send + Sync {
    /// Enumerate event directory locators. Order has no correctness impact.
    fn list_events(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Raw file names under one event's directory, unordered and unfiltered.
    fn list_episode_files(&self, event_path: &str)
    -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Fetch and parse one episode's feature collection.
    fn fetch_features(&self, locator: &str)
    -> impl Future<Output = Result<FeatureCollection>> + Send;

    /// Directory locator for one event id, for incremental reconciliation.
    fn event_locator(&self, event_id: i64) -> String;
}
