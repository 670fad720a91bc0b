//! Shared types, error model, and configuration for stormtrack.
//!
//! This crate is the foundation depended on by all other stormtrack crates.
//! It provides:
//! - [`StormtrackError`] — the unified error type
//! - Domain records ([`EventMeta`], [`Node`], [`Buffer`], [`Track`])
//! - The GeoJSON wire model ([`FeatureCollection`], [`Feature`], [`Geometry`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod geo;
pub mod geojson;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FeedConfig, IngestConfig, StorageConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from,
};
pub use error::{Result, StormtrackError};
pub use geo::{GeoPoint, PolygonGeom, Polyline};
pub use geojson::{Feature, FeatureCollection, Geometry};
pub use types::{
    Buffer, EpisodeNotice, EventMeta, Node, Severity, Track, feature_timestamp,
    parse_advisory_date,
};
