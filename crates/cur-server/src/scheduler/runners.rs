//! TaskRunner adapters, one per job kind.
//!
//! A runner executes the underlying operation for a job's scope, reports
//! progress through the [`ProgressHandle`], and polls its cancellation token
//! at each per-item boundary. A clean early return under a cancellation
//! request is recorded by the scheduler as cancelled, never completed.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cur_core::events::{EventCategory, EventPayload};
use cur_core::{Error, Result};
use cur_db::models::{Item, Library, Source};
use cur_db::pool::DbPool;
use cur_db::queries;
use cur_engine::{classify, diff_catalog, diff_series, MediaTechInfo};

use crate::context::ConfigStore;
use crate::providers::{CatalogProvider, MusicCatalogProvider, ScanProvider};
use crate::scheduler::job::{Job, JobKind, ScanSummary};
use crate::scheduler::ProgressHandle;

/// What a runner's body produced.
#[derive(Debug)]
pub enum RunOutcome {
    /// The work finished; scan jobs carry a result summary.
    Completed(Option<ScanSummary>),
    /// The runner observed a cancellation request and exited early.
    Cancelled,
}

/// Adapter contract between the scheduler and one kind of work.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome>;
}

// ---------------------------------------------------------------------------
// Scope helpers
// ---------------------------------------------------------------------------

fn load_library(db: &DbPool, job: &Job) -> Result<(Source, Library)> {
    let library_id = job
        .scope
        .library_id
        .ok_or_else(|| Error::Validation("job scope has no library_id".into()))?;
    let conn = cur_db::pool::get_conn(db)?;
    let library = queries::libraries::get_library(&conn, library_id)?
        .ok_or_else(|| Error::not_found("library", library_id))?;
    let source = queries::sources::get_source(&conn, library.source_id)?
        .ok_or_else(|| Error::not_found("source", library.source_id))?;
    Ok((source, library))
}

fn tech_info(item: &Item) -> MediaTechInfo {
    MediaTechInfo {
        resolution: item.resolution.clone(),
        video_codec: item.video_codec.clone(),
        video_bitrate_kbps: item.video_bitrate_kbps,
        audio_tracks: item.audio_tracks.clone(),
    }
}

/// Owned-identifier set for a series: episodes encoded as `s{season}e{episode}`
/// to match the catalog provider's entry ids. Episodes without both numbers
/// cannot be reconciled and are skipped.
fn owned_episode_ids(episodes: &[Item]) -> HashSet<String> {
    episodes
        .iter()
        .filter_map(|ep| match (ep.season_number, ep.episode_number) {
            (Some(s), Some(e)) => Some(format!("s{s}e{e}")),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scan runners
// ---------------------------------------------------------------------------

/// Scans a video library and refreshes quality scores for its file items.
pub struct LibraryScanRunner {
    db: DbPool,
    scan: Arc<dyn ScanProvider>,
    config_store: Arc<ConfigStore>,
}

impl LibraryScanRunner {
    pub fn new(db: DbPool, scan: Arc<dyn ScanProvider>, config_store: Arc<ConfigStore>) -> Self {
        Self {
            db,
            scan,
            config_store,
        }
    }
}

#[async_trait]
impl TaskRunner for LibraryScanRunner {
    fn kind(&self) -> JobKind {
        JobKind::LibraryScan
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let (source, library) = load_library(&self.db, job)?;

        let scan_progress = progress.clone();
        let summary = self
            .scan
            .scan(&source, &library, &cancel, &move |cur, total, item| {
                scan_progress.report(cur, total, "scanning", item);
            })
            .await?;
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // Classification checkpoint granularity: one item per poll.
        let thresholds = self.config_store.quality_thresholds();
        let conn = cur_db::pool::get_conn(&self.db)?;
        let file_items = queries::items::list_file_items(&conn, library.id)?;
        let total = file_items.len() as u64;

        for (idx, item) in file_items.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            progress.report(idx as u64 + 1, total, "classifying", Some(&item.name));

            let score = classify(&tech_info(item), &thresholds);
            queries::quality::upsert_quality(&conn, item.id, &score)?;
            progress.bus().broadcast(
                EventCategory::User,
                EventPayload::QualityScored {
                    item_id: item.id,
                    tier_quality: score.tier_quality.as_str().to_string(),
                    needs_upgrade: score.needs_upgrade,
                },
            );
        }

        progress.bus().broadcast(
            EventCategory::User,
            EventPayload::LibraryScanComplete {
                library_id: library.id,
                scanned: summary.items_scanned,
                added: summary.items_added,
                updated: summary.items_updated,
                removed: summary.items_removed,
            },
        );

        Ok(RunOutcome::Completed(Some(summary)))
    }
}

/// Scans a music library. No quality pass; tracks carry no video metadata.
pub struct MusicScanRunner {
    db: DbPool,
    scan: Arc<dyn ScanProvider>,
}

impl MusicScanRunner {
    pub fn new(db: DbPool, scan: Arc<dyn ScanProvider>) -> Self {
        Self { db, scan }
    }
}

#[async_trait]
impl TaskRunner for MusicScanRunner {
    fn kind(&self) -> JobKind {
        JobKind::MusicScan
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let (source, library) = load_library(&self.db, job)?;

        let scan_progress = progress.clone();
        let summary = self
            .scan
            .scan(&source, &library, &cancel, &move |cur, total, item| {
                scan_progress.report(cur, total, "scanning", item);
            })
            .await?;
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        progress.bus().broadcast(
            EventCategory::User,
            EventPayload::LibraryScanComplete {
                library_id: library.id,
                scanned: summary.items_scanned,
                added: summary.items_added,
                updated: summary.items_updated,
                removed: summary.items_removed,
            },
        );

        Ok(RunOutcome::Completed(Some(summary)))
    }
}

/// Scans every library of a source in turn, aggregating the summaries.
pub struct SourceScanRunner {
    db: DbPool,
    scan: Arc<dyn ScanProvider>,
}

impl SourceScanRunner {
    pub fn new(db: DbPool, scan: Arc<dyn ScanProvider>) -> Self {
        Self { db, scan }
    }
}

#[async_trait]
impl TaskRunner for SourceScanRunner {
    fn kind(&self) -> JobKind {
        JobKind::SourceScan
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let source_id = job
            .scope
            .source_id
            .ok_or_else(|| Error::Validation("job scope has no source_id".into()))?;

        let (source, libraries) = {
            let conn = cur_db::pool::get_conn(&self.db)?;
            let source = queries::sources::get_source(&conn, source_id)?
                .ok_or_else(|| Error::not_found("source", source_id))?;
            let libraries = queries::libraries::list_libraries(&conn, Some(source_id))?;
            (source, libraries)
        };

        let mut aggregate = ScanSummary::default();
        let total = libraries.len() as u64;

        // Checkpoint granularity: one library per poll; the provider polls
        // per file within each.
        for (idx, library) in libraries.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            progress.report(idx as u64 + 1, total, "scanning", Some(&library.name));

            let summary = self
                .scan
                .scan(&source, library, &cancel, &|_, _, _| {})
                .await?;
            aggregate.items_scanned += summary.items_scanned;
            aggregate.items_added += summary.items_added;
            aggregate.items_updated += summary.items_updated;
            aggregate.items_removed += summary.items_removed;
        }

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        Ok(RunOutcome::Completed(Some(aggregate)))
    }
}

// ---------------------------------------------------------------------------
// Completeness runners
// ---------------------------------------------------------------------------

/// Diffs every series in a library against its canonical episode listing.
pub struct SeriesCompletenessRunner {
    db: DbPool,
    catalog: Arc<dyn CatalogProvider>,
}

impl SeriesCompletenessRunner {
    pub fn new(db: DbPool, catalog: Arc<dyn CatalogProvider>) -> Self {
        Self { db, catalog }
    }
}

#[async_trait]
impl TaskRunner for SeriesCompletenessRunner {
    fn kind(&self) -> JobKind {
        JobKind::SeriesCompleteness
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let (_, library) = load_library(&self.db, job)?;

        let series = {
            let conn = cur_db::pool::get_conn(&self.db)?;
            queries::items::list_by_kind(&conn, library.id, cur_core::ItemKind::Series)?
        };
        let total = series.len() as u64;

        for (idx, show) in series.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            progress.report(idx as u64 + 1, total, "analyzing", Some(&show.name));

            let Some(ref tmdb_id) = show.tmdb_id else {
                tracing::debug!(item_id = %show.id, name = %show.name, "No TMDB id, skipping");
                continue;
            };

            let listing = self.catalog.series_listing(tmdb_id).await?;

            let conn = cur_db::pool::get_conn(&self.db)?;
            let episodes = queries::items::list_children(&conn, show.id)?;
            let owned = owned_episode_ids(&episodes);
            let result = diff_series(&owned, &listing);

            queries::completeness::upsert_completeness(
                &conn,
                show.id,
                "series",
                &result.record,
                &result.seasons,
            )?;
            progress.bus().broadcast(
                EventCategory::User,
                EventPayload::CompletenessUpdated {
                    item_id: show.id,
                    percentage: result.record.completeness_percentage,
                    missing: result.record.missing_items.len() as u64,
                },
            );
        }

        Ok(RunOutcome::Completed(None))
    }
}

/// Diffs every collection in a library against its TMDB parts list. The
/// owned set is every movie in the library with a TMDB id, so a collection
/// entry counts as owned wherever the movie lives in the library.
pub struct CollectionCompletenessRunner {
    db: DbPool,
    catalog: Arc<dyn CatalogProvider>,
}

impl CollectionCompletenessRunner {
    pub fn new(db: DbPool, catalog: Arc<dyn CatalogProvider>) -> Self {
        Self { db, catalog }
    }
}

#[async_trait]
impl TaskRunner for CollectionCompletenessRunner {
    fn kind(&self) -> JobKind {
        JobKind::CollectionCompleteness
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let (_, library) = load_library(&self.db, job)?;

        let (collections, owned) = {
            let conn = cur_db::pool::get_conn(&self.db)?;
            let collections =
                queries::items::list_by_kind(&conn, library.id, cur_core::ItemKind::Collection)?;
            let owned: HashSet<String> =
                queries::items::list_by_kind(&conn, library.id, cur_core::ItemKind::Movie)?
                    .into_iter()
                    .filter_map(|m| m.tmdb_id)
                    .collect();
            (collections, owned)
        };
        let total = collections.len() as u64;

        for (idx, collection) in collections.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            progress.report(idx as u64 + 1, total, "analyzing", Some(&collection.name));

            let Some(ref tmdb_id) = collection.tmdb_id else {
                continue;
            };
            let listing = self.catalog.collection_listing(tmdb_id).await?;
            let record = diff_catalog(&owned, &listing);

            let conn = cur_db::pool::get_conn(&self.db)?;
            queries::completeness::upsert_completeness(
                &conn,
                collection.id,
                "collection",
                &record,
                &[],
            )?;
            progress.bus().broadcast(
                EventCategory::User,
                EventPayload::CompletenessUpdated {
                    item_id: collection.id,
                    percentage: record.completeness_percentage,
                    missing: record.missing_items.len() as u64,
                },
            );
        }

        Ok(RunOutcome::Completed(None))
    }
}

/// Diffs every artist in a library against their MusicBrainz discography.
pub struct MusicCompletenessRunner {
    db: DbPool,
    music: Arc<dyn MusicCatalogProvider>,
}

impl MusicCompletenessRunner {
    pub fn new(db: DbPool, music: Arc<dyn MusicCatalogProvider>) -> Self {
        Self { db, music }
    }
}

#[async_trait]
impl TaskRunner for MusicCompletenessRunner {
    fn kind(&self) -> JobKind {
        JobKind::MusicCompleteness
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let (_, library) = load_library(&self.db, job)?;

        let artists = {
            let conn = cur_db::pool::get_conn(&self.db)?;
            queries::items::list_by_kind(&conn, library.id, cur_core::ItemKind::Artist)?
        };
        let total = artists.len() as u64;

        for (idx, artist) in artists.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            progress.report(idx as u64 + 1, total, "analyzing", Some(&artist.name));

            let Some(ref mbid) = artist.musicbrainz_id else {
                tracing::debug!(item_id = %artist.id, name = %artist.name, "No MusicBrainz id, skipping");
                continue;
            };
            let listing = self.music.artist_releases(mbid).await?;

            let conn = cur_db::pool::get_conn(&self.db)?;
            let owned: HashSet<String> = queries::items::list_children(&conn, artist.id)?
                .into_iter()
                .filter_map(|album| album.musicbrainz_id)
                .collect();
            let record = diff_catalog(&owned, &listing);

            queries::completeness::upsert_completeness(&conn, artist.id, "artist", &record, &[])?;
            progress.bus().broadcast(
                EventCategory::User,
                EventPayload::CompletenessUpdated {
                    item_id: artist.id,
                    percentage: record.completeness_percentage,
                    missing: record.missing_items.len() as u64,
                },
            );
        }

        Ok(RunOutcome::Completed(None))
    }
}
