//! RAWG.io game metadata lookups.
//!
//! One search request per record submission, best match only. The client is
//! constructed only when a credential exists, so holding a [`RawgClient`] is
//! itself the proof that enrichment is enabled.

use std::time::Duration;

use platinum_tracker_core::{GameMetadata, MetadataSource, TrackerError};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.rawg.io/api";

pub struct RawgClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl RawgClient {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Client against a non-default endpoint; used by tests pointed at a
    /// local stub server.
    #[must_use]
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();

        Self { agent, base_url: base_url.trim_end_matches('/').to_string(), api_key }
    }
}

impl MetadataSource for RawgClient {
    fn lookup(&self, name: &str) -> Result<Option<GameMetadata>, TrackerError> {
        let url = format!("{}/games", self.base_url);
        log::debug!("querying game metadata for {name:?}");

        let response = self
            .agent
            .get(&url)
            .query("key", &self.api_key)
            .query("search", name)
            .query("page_size", "1")
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => {
                    TrackerError::Transport(format!("metadata service returned HTTP {code}"))
                }
                other => TrackerError::Transport(format!("metadata request failed: {other}")),
            })?;

        let parsed: SearchResponse = response
            .into_json()
            .map_err(|err| TrackerError::Transport(format!("undecodable metadata body: {err}")))?;

        Ok(parsed.results.into_iter().next().map(GameMetadata::from))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    background_image: Option<String>,
    #[serde(default)]
    genres: Vec<GenreEntry>,
    #[serde(default)]
    playtime: u32,
    #[serde(default)]
    metacritic: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GenreEntry {
    name: String,
}

impl From<SearchResult> for GameMetadata {
    fn from(result: SearchResult) -> Self {
        Self {
            image: result.background_image,
            genres: result.genres.into_iter().map(|genre| genre.name).collect(),
            playtime_hours: result.playtime,
            metacritic: result.metacritic,
        }
    }
}
