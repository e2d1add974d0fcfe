//! Local-folder scan provider.
//!
//! Walks a library's folder, filters by media extension, and synchronizes the
//! items table: new files are inserted (with a naive name/year or
//! season/episode parse), known files whose filename metadata changed are
//! refreshed, and rows whose file has disappeared are removed.
//!
//! Layout conventions: movies are flat files named `Title (Year).ext`; TV
//! files live under `Series Name/...` with `SxxEyy` in the filename; music
//! files live under `Artist/Album/track.ext`. Release-style filename tokens
//! (`1080p`, `x265`, ...) seed the item's resolution and video codec; a tech
//! report with measured values can overwrite them later.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use cur_core::{Error, ItemId, ItemKind, LibraryId, MediaType, Result};
use cur_db::models::{Item, Library, Source};
use cur_db::pool::DbPool;
use cur_db::queries::items::{self, NewItem};

use crate::providers::{ScanProgressFn, ScanProvider};
use crate::scheduler::job::ScanSummary;

pub struct LocalScanProvider {
    db: DbPool,
    extensions: Vec<String>,
}

impl LocalScanProvider {
    pub fn new(db: DbPool, extensions: Vec<String>) -> Self {
        Self { db, extensions }
    }

    fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| x == &e)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl ScanProvider for LocalScanProvider {
    async fn scan(
        &self,
        source: &Source,
        library: &Library,
        cancel: &CancellationToken,
        progress: ScanProgressFn<'_>,
    ) -> Result<ScanSummary> {
        let root = library
            .path
            .as_deref()
            .or(source.root_path.as_deref())
            .ok_or_else(|| {
                Error::Validation(format!("library {} has no folder path", library.id))
            })?;
        let root = Path::new(root);
        if !root.is_dir() {
            return Err(Error::provider(
                "local",
                format!("scan root is not a directory: {}", root.display()),
            ));
        }

        let media_type = MediaType::parse(&library.media_type)
            .ok_or_else(|| Error::Internal(format!("unknown media type {}", library.media_type)))?;

        // Collect media files up front so progress has a stable total.
        let mut files: Vec<std::path::PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.is_media_file(p))
            .collect();
        files.sort();

        let conn = cur_db::pool::get_conn(&self.db)?;
        let known: HashMap<String, Item> = items::list_file_items(&conn, library.id)?
            .into_iter()
            .filter_map(|i| i.file_path.clone().map(|p| (p, i)))
            .collect();

        let mut summary = ScanSummary {
            items_scanned: files.len() as u64,
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::with_capacity(files.len());
        let total = files.len() as u64;

        for (idx, file) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(summary);
            }
            let path_str = file.to_string_lossy().to_string();
            progress(idx as u64 + 1, total, file.file_name().and_then(|n| n.to_str()));

            if let Some(item) = known.get(&path_str) {
                // Only counts as updated when the row actually changed.
                if refresh_known_item(&conn, item, file)? {
                    summary.items_updated += 1;
                }
            } else {
                ingest_file(&conn, library.id, media_type, root, file, &path_str)?;
                summary.items_added += 1;
            }
            seen.insert(path_str);
        }

        // Remove rows whose file has disappeared (skipped on a cancelled
        // partial pass, which returned above).
        for (path, item) in &known {
            if !seen.contains(path) {
                items::delete_item(&conn, item.id)?;
                summary.items_removed += 1;
            }
        }

        Ok(summary)
    }
}

/// Insert an item for a newly discovered file, creating container items
/// (series, artist, album) as needed. Filename tech tokens seed the new
/// row's resolution and codec.
fn ingest_file(
    conn: &rusqlite::Connection,
    library_id: LibraryId,
    media_type: MediaType,
    root: &Path,
    file: &Path,
    path_str: &str,
) -> Result<()> {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    let relative = file.strip_prefix(root).unwrap_or(file);
    let components: Vec<&str> = relative
        .parent()
        .map(|p| p.iter().filter_map(|c| c.to_str()).collect())
        .unwrap_or_default();

    let item = match media_type {
        MediaType::Movies => {
            let (name, year) = parse_title_year(stem);
            items::insert_item(
                conn,
                library_id,
                ItemKind::Movie,
                &NewItem {
                    name: &name,
                    year,
                    file_path: Some(path_str),
                    ..Default::default()
                },
            )?
        }
        MediaType::Tv => {
            let series_name = components.first().copied().unwrap_or(stem);
            let series_id = find_or_create(conn, library_id, ItemKind::Series, series_name, None)?;
            let (season, episode) = parse_season_episode(stem);
            items::insert_item(
                conn,
                library_id,
                ItemKind::Episode,
                &NewItem {
                    parent_id: Some(series_id),
                    name: stem,
                    season_number: season,
                    episode_number: episode,
                    file_path: Some(path_str),
                    ..Default::default()
                },
            )?
        }
        MediaType::Music => {
            let artist_name = components.first().copied().unwrap_or("Unknown Artist");
            let album_name = components.get(1).copied().unwrap_or("Unknown Album");
            let artist_id = find_or_create(conn, library_id, ItemKind::Artist, artist_name, None)?;
            let album_id =
                find_or_create(conn, library_id, ItemKind::Album, album_name, Some(artist_id))?;
            items::insert_item(
                conn,
                library_id,
                ItemKind::Track,
                &NewItem {
                    parent_id: Some(album_id),
                    name: stem,
                    file_path: Some(path_str),
                    ..Default::default()
                },
            )?
        }
    };

    let (resolution, codec) = parse_tech_tokens(stem);
    if resolution.is_some() || codec.is_some() {
        items::update_tech_info(conn, item.id, resolution, codec, None, &[])?;
    }
    Ok(())
}

/// Re-read the filename tokens for a file that is already in the table and
/// fold any changes into the row. Bitrate and audio tracks are never taken
/// from filenames, so values reported through the tech endpoint survive the
/// rescan. Returns whether the row was rewritten.
fn refresh_known_item(conn: &rusqlite::Connection, item: &Item, file: &Path) -> Result<bool> {
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let (resolution, codec) = parse_tech_tokens(stem);

    let resolution_changed = resolution.is_some_and(|t| item.resolution.as_deref() != Some(t));
    let codec_changed = codec.is_some_and(|t| item.video_codec.as_deref() != Some(t));
    if !resolution_changed && !codec_changed {
        return Ok(false);
    }

    items::update_tech_info(
        conn,
        item.id,
        resolution.or(item.resolution.as_deref()),
        codec.or(item.video_codec.as_deref()),
        item.video_bitrate_kbps,
        &item.audio_tracks,
    )
}

fn find_or_create(
    conn: &rusqlite::Connection,
    library_id: LibraryId,
    kind: ItemKind,
    name: &str,
    parent_id: Option<ItemId>,
) -> Result<ItemId> {
    if let Some(existing) = items::find_by_name(conn, library_id, kind, name)? {
        return Ok(existing.id);
    }
    let item = items::insert_item(
        conn,
        library_id,
        kind,
        &NewItem {
            parent_id,
            name,
            ..Default::default()
        },
    )?;
    Ok(item.id)
}

// ---------------------------------------------------------------------------
// Filename parsing
// ---------------------------------------------------------------------------

/// Parse `"Title (1995)"` into name and year. Anything without a trailing
/// parenthesized 4-digit year keeps the full stem as the name.
fn parse_title_year(stem: &str) -> (String, Option<i32>) {
    let trimmed = stem.trim_end();
    if let Some(open) = trimmed.rfind('(') {
        if let Some(inner) = trimmed[open + 1..].strip_suffix(')') {
            if inner.len() == 4 && inner.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(year) = inner.parse() {
                    return (trimmed[..open].trim_end().to_string(), Some(year));
                }
            }
        }
    }
    (trimmed.to_string(), None)
}

/// Pick resolution and video-codec tokens out of a release-style filename.
/// Later tokens win, matching how release names append fixups.
fn parse_tech_tokens(stem: &str) -> (Option<&'static str>, Option<&'static str>) {
    let mut resolution = None;
    let mut codec = None;
    for token in stem.split(|c: char| !c.is_ascii_alphanumeric()) {
        match token.to_ascii_lowercase().as_str() {
            "2160p" | "4k" | "uhd" => resolution = Some("2160p"),
            "1080p" | "1080i" => resolution = Some("1080p"),
            "720p" => resolution = Some("720p"),
            "480p" | "576p" => resolution = Some("480p"),
            "x265" | "h265" | "hevc" => codec = Some("hevc"),
            "x264" | "h264" | "avc" => codec = Some("h264"),
            "av1" => codec = Some("av1"),
            "vp9" => codec = Some("vp9"),
            _ => {}
        }
    }
    (resolution, codec)
}

/// Find an `SxxEyy` marker anywhere in the stem (case-insensitive).
fn parse_season_episode(stem: &str) -> (Option<i32>, Option<i32>) {
    let bytes = stem.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].eq_ignore_ascii_case(&b's') {
            let season_start = i + 1;
            let mut j = season_start;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > season_start && j < bytes.len() && bytes[j].eq_ignore_ascii_case(&b'e') {
                let ep_start = j + 1;
                let mut k = ep_start;
                while k < bytes.len() && bytes[k].is_ascii_digit() {
                    k += 1;
                }
                if k > ep_start {
                    let season = stem[season_start..j].parse().ok();
                    let episode = stem[ep_start..k].parse().ok();
                    if season.is_some() && episode.is_some() {
                        return (season, episode);
                    }
                }
            }
        }
        i += 1;
    }
    (None, None)
}
