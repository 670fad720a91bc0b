//! Episode locator ordering.
//!
//! Event directories contain files named `geojson_<event>_<sequence>.geojson`
//! plus assorted extras (shapefiles, partial exports). Only the three-part
//! geojson names are episodes; their numeric suffix is the strict ordering
//! key for the reducer.

use std::sync::OnceLock;

use regex::Regex;

/// A locator for one episode snapshot, with its parsed sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    pub locator: String,
    pub sequence: i64,
}

fn episode_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|/)geojson_(\d+)_(\d+)\.geojson$").expect("valid regex"))
}

/// Parse the numeric sequence suffix from an episode file name.
/// Returns `None` for anything that is not a three-part geojson name.
pub fn episode_sequence(name: &str) -> Option<i64> {
    let caps = episode_file_re().captures(name)?;
    caps.get(2)?.as_str().parse().ok()
}

/// Filter a raw file listing down to episode locators, sorted strictly
/// ascending by sequence. Unparseable names are dropped, not errors.
pub fn order_episodes(names: &[String]) -> Vec<EpisodeRef> {
    let mut refs: Vec<EpisodeRef> = names
        .iter()
        .filter_map(|name| {
            episode_sequence(name).map(|sequence| EpisodeRef {
                locator: name.clone(),
                sequence,
            })
        })
        .collect();

    refs.sort_by_key(|r| r.sequence);
    refs.dedup_by_key(|r| r.sequence);
    refs
}

/// The trailing numeric path component of an event directory locator, e.g.
/// `/datareport/resources/TC/1000132/` → `1000132`.
pub fn event_id_from_path(path: &str) -> Option<i64> {
    path.split('/')
        .filter(|part| !part.is_empty())
        .next_back()?
        .parse()
        .ok()
}
