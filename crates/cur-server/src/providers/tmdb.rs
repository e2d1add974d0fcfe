//! TMDB (The Movie Database) API client.
//!
//! Serves canonical listings for completeness analysis: per-episode series
//! listings and movie-collection parts. Rate-limited to stay within TMDB's
//! API budget.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;

use cur_core::{Error, Result};
use cur_engine::CatalogEntry;

use crate::providers::CatalogProvider;

const BASE_URL: &str = "https://api.themoviedb.org/3";

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct TmdbClient {
    http: reqwest::Client,
    api_key: Option<String>,
    language: String,
    limiter: Arc<DirectLimiter>,
}

impl TmdbClient {
    pub fn new(api_key: Option<String>, language: String, requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            http: reqwest::Client::new(),
            api_key,
            language,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let Some(ref api_key) = self.api_key else {
            return Err(Error::provider("tmdb", "no API key configured"));
        };
        self.limiter.until_ready().await;

        let url = format!("{BASE_URL}{path}");
        let params = [("api_key", api_key.as_str()), ("language", &self.language)];

        let resp = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::provider("tmdb", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::provider("tmdb", format!("{status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::provider("tmdb", format!("parse error: {e}")))
    }
}

#[async_trait]
impl CatalogProvider for TmdbClient {
    async fn series_listing(&self, tmdb_id: &str) -> Result<Vec<CatalogEntry>> {
        let show: TmdbTvShow = self.get(&format!("/tv/{tmdb_id}")).await?;

        let mut entries = Vec::new();
        for season in &show.seasons {
            // Season 0 on TMDB is specials; include it so owned specials
            // reconcile, matching the diff engine's specials grouping.
            let detail: TmdbSeason = self
                .get(&format!("/tv/{tmdb_id}/season/{}", season.season_number))
                .await?;
            for ep in detail.episodes {
                entries.push(CatalogEntry {
                    external_id: format!("s{}e{}", ep.season_number, ep.episode_number),
                    title: ep.name.unwrap_or_else(|| {
                        format!("Episode {}", ep.episode_number)
                    }),
                    year: ep.air_date.as_deref().and_then(parse_year),
                    season: Some(ep.season_number),
                    episode: Some(ep.episode_number),
                });
            }
        }
        Ok(entries)
    }

    async fn collection_listing(&self, tmdb_id: &str) -> Result<Vec<CatalogEntry>> {
        let collection: TmdbCollection = self.get(&format!("/collection/{tmdb_id}")).await?;
        Ok(collection
            .parts
            .into_iter()
            .map(|part| CatalogEntry {
                external_id: part.id.to_string(),
                title: part.title,
                year: part.release_date.as_deref().and_then(parse_year),
                season: None,
                episode: None,
            })
            .collect())
    }
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TmdbTvShow {
    seasons: Vec<TmdbSeasonStub>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonStub {
    season_number: i32,
}

#[derive(Debug, Deserialize)]
struct TmdbSeason {
    #[serde(default)]
    episodes: Vec<TmdbEpisode>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisode {
    season_number: i32,
    episode_number: i32,
    name: Option<String>,
    air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbCollection {
    #[serde(default)]
    parts: Vec<TmdbCollectionPart>,
}

#[derive(Debug, Deserialize)]
struct TmdbCollectionPart {
    id: u64,
    title: String,
    release_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_parse() {
        assert_eq!(parse_year("1999-03-31"), Some(1999));
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("n/a"), None);
    }

    #[tokio::test]
    async fn missing_api_key_is_provider_error() {
        let client = TmdbClient::new(None, "en-US".into(), 30);
        let err = client.series_listing("1438").await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn collection_response_parses() {
        let json = r#"{
            "id": 119,
            "name": "The Lord of the Rings Collection",
            "parts": [
                {"id": 120, "title": "The Fellowship of the Ring", "release_date": "2001-12-18"},
                {"id": 121, "title": "The Two Towers", "release_date": "2002-12-18"}
            ]
        }"#;
        let parsed: TmdbCollection = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.parts.len(), 2);
        assert_eq!(parsed.parts[0].id, 120);
    }

    #[test]
    fn season_response_parses() {
        let json = r#"{
            "episodes": [
                {"season_number": 1, "episode_number": 1, "name": "The Target", "air_date": "2002-06-02"},
                {"season_number": 1, "episode_number": 2, "name": null, "air_date": null}
            ]
        }"#;
        let parsed: TmdbSeason = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.episodes.len(), 2);
        assert!(parsed.episodes[1].name.is_none());
    }
}
