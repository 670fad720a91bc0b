//! HTTP implementation of [`HazardFeed`] for GDACS-style servers.
//!
//! Event directories are plain autoindex pages (`<pre><a href>`), episodes
//! are geojson files inside them. All requests share one client with a
//! bounded timeout; retry policy is left to the caller's next poll.

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use stormtrack_shared::{FeatureCollection, Result, StormtrackError};

use crate::{HazardFeed, listing::event_id_from_path};

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("stormtrack/", env!("CARGO_PKG_VERSION"));

/// Tropical-cyclone dataset directory under the feed base URL.
const TC_DATASET_PATH: &str = "datareport/resources/TC/";

/// HTTP client for the advisory feed.
#[derive(Debug, Clone)]
pub struct GdacsClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GdacsClient {
    /// Create a client against `base_url` with the given request timeout.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StormtrackError::config(format!("invalid feed base URL: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StormtrackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Resolve a feed-relative locator against the base URL.
    fn absolute(&self, locator: &str) -> Result<Url> {
        self.base_url
            .join(locator)
            .map_err(|e| StormtrackError::validation(format!("bad locator {locator:?}: {e}")))
    }

    async fn get_checked(&self, url: Url) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StormtrackError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StormtrackError::Network(format!("{url}: HTTP {status}")));
        }
        Ok(response)
    }

    /// Fetch an autoindex page and return its link targets.
    #[instrument(skip(self))]
    async fn get_listing(&self, locator: &str) -> Result<Vec<String>> {
        let url = self.absolute(locator)?;
        let body = self
            .get_checked(url.clone())
            .await?
            .text()
            .await
            .map_err(|e| StormtrackError::Network(format!("{url}: body read failed: {e}")))?;

        let links = parse_listing(&body);
        debug!(locator, links = links.len(), "listing fetched");
        Ok(links)
    }
}

impl HazardFeed for GdacsClient {
    async fn list_events(&self) -> Result<Vec<String>> {
        let links = self.get_listing(TC_DATASET_PATH).await?;
        Ok(links
            .into_iter()
            .filter(|href| event_id_from_path(href).is_some())
            .collect())
    }

    async fn list_episode_files(&self, event_path: &str) -> Result<Vec<String>> {
        self.get_listing(event_path).await
    }

    fn event_locator(&self, event_id: i64) -> String {
        format!("/{TC_DATASET_PATH}{event_id}/")
    }

    #[instrument(skip(self))]
    async fn fetch_features(&self, locator: &str) -> Result<FeatureCollection> {
        let url = self.absolute(locator)?;
        self.get_checked(url.clone())
            .await?
            .json::<FeatureCollection>()
            .await
            .map_err(|e| StormtrackError::parse(format!("{url}: invalid feature collection: {e}")))
    }
}

/// Extract the `href` targets from an autoindex `<pre>` block.
fn parse_listing(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("pre a[href]").expect("valid selector");
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}
