//! MusicBrainz API client.
//!
//! Serves artist discographies (album release groups) for music completeness
//! analysis. MusicBrainz policy requires a meaningful User-Agent and allows
//! one request per second; both come from [`MetadataConfig`].
//!
//! [`MetadataConfig`]: cur_core::config::MetadataConfig

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;

use cur_core::{Error, Result};
use cur_engine::CatalogEntry;

use crate::providers::MusicCatalogProvider;

const BASE_URL: &str = "https://musicbrainz.org/ws/2";
const PAGE_SIZE: u32 = 100;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct MusicBrainzClient {
    http: reqwest::Client,
    user_agent: String,
    limiter: Arc<DirectLimiter>,
}

impl MusicBrainzClient {
    pub fn new(user_agent: String, requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            http: reqwest::Client::new(),
            user_agent,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        self.limiter.until_ready().await;

        let url = format!("{BASE_URL}{path}");
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(params)
            .query(&[("fmt", "json")])
            .send()
            .await
            .map_err(|e| Error::provider("musicbrainz", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::provider("musicbrainz", format!("{status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::provider("musicbrainz", format!("parse error: {e}")))
    }
}

#[async_trait]
impl MusicCatalogProvider for MusicBrainzClient {
    async fn artist_releases(&self, musicbrainz_id: &str) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        let mut offset: u32 = 0;

        loop {
            let offset_str = offset.to_string();
            let limit_str = PAGE_SIZE.to_string();
            let page: ReleaseGroupResponse = self
                .get(
                    "/release-group",
                    &[
                        ("artist", musicbrainz_id),
                        ("type", "album"),
                        ("limit", &limit_str),
                        ("offset", &offset_str),
                    ],
                )
                .await?;

            let count = page.release_groups.len() as u32;
            for rg in page.release_groups {
                entries.push(CatalogEntry {
                    external_id: rg.id,
                    title: rg.title,
                    year: rg.first_release_date.as_deref().and_then(parse_year),
                    season: None,
                    episode: None,
                });
            }

            offset += count;
            if count < PAGE_SIZE || offset >= page.release_group_count {
                break;
            }
        }

        // Ordered by release date so the missing list reads chronologically.
        entries.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.title.cmp(&b.title)));
        Ok(entries)
    }
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReleaseGroupResponse {
    #[serde(rename = "release-group-count", default)]
    release_group_count: u32,
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<ReleaseGroup>,
}

#[derive(Debug, Deserialize)]
struct ReleaseGroup {
    id: String,
    title: String,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
}
