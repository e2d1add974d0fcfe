//! External collaborators: scan providers and catalog metadata providers.
//!
//! The scheduler's runners only see these traits. Remote media-server kinds
//! (plex, jellyfin, emby, kodi) would plug in here; the `local` kind ships a
//! concrete implementation in [`local`].

pub mod local;
pub mod musicbrainz;
pub mod tmdb;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cur_core::Result;
use cur_db::models::{Library, Source};
use cur_engine::CatalogEntry;

use crate::scheduler::job::ScanSummary;

/// Progress callback for scan providers: (current, total, current_item).
pub type ScanProgressFn<'a> = &'a (dyn Fn(u64, u64, Option<&str>) + Send + Sync);

/// Synchronizes a library's items with its backing source.
///
/// Implementations must poll `cancel` at each per-file boundary and return
/// early with the partial summary when cancellation is requested; the
/// scheduler records the job as cancelled, not completed.
#[async_trait]
pub trait ScanProvider: Send + Sync {
    async fn scan(
        &self,
        source: &Source,
        library: &Library,
        cancel: &CancellationToken,
        progress: ScanProgressFn<'_>,
    ) -> Result<ScanSummary>;
}

/// Canonical listings for movies and TV (TMDB).
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Every episode of a series, entry ids encoded as `s{season}e{episode}`.
    async fn series_listing(&self, tmdb_id: &str) -> Result<Vec<CatalogEntry>>;

    /// Every movie in a collection, entry ids being TMDB movie ids.
    async fn collection_listing(&self, tmdb_id: &str) -> Result<Vec<CatalogEntry>>;
}

/// Canonical discographies (MusicBrainz).
#[async_trait]
pub trait MusicCatalogProvider: Send + Sync {
    /// An artist's studio release groups, entry ids being MusicBrainz
    /// release-group ids.
    async fn artist_releases(&self, musicbrainz_id: &str) -> Result<Vec<CatalogEntry>>;
}
