//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. JSON columns parse defensively: a corrupted column
//! yields an empty collection rather than failing the whole row.

use cur_engine::{AudioTrackInfo, CatalogEntry, SeasonGap};
use cur_core::{ItemId, LibraryId, SourceId};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

fn parse_opt_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let uuid = Uuid::parse_str(&v).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(Some(T::from(uuid)))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: String,
    pub url: Option<String>,
    pub root_path: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

impl Source {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            url: row.get(3)?,
            root_path: row.get(4)?,
            enabled: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Library {
    pub id: LibraryId,
    pub source_id: SourceId,
    pub name: String,
    pub media_type: String,
    pub path: Option<String>,
    pub created_at: String,
}

impl Library {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            source_id: parse_id(row, 1)?,
            name: row.get(2)?,
            media_type: row.get(3)?,
            path: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub library_id: LibraryId,
    pub parent_id: Option<ItemId>,
    pub kind: String,
    pub name: String,
    pub year: Option<i32>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub tmdb_id: Option<String>,
    pub musicbrainz_id: Option<String>,
    pub file_path: Option<String>,
    pub resolution: Option<String>,
    pub video_codec: Option<String>,
    pub video_bitrate_kbps: Option<u32>,
    pub audio_tracks: Vec<AudioTrackInfo>,
    pub created_at: String,
    pub updated_at: String,
}

impl Item {
    /// Build from a row selected as:
    /// id, library_id, parent_id, kind, name, year, season_number,
    /// episode_number, tmdb_id, musicbrainz_id, file_path, resolution,
    /// video_codec, video_bitrate_kbps, audio_tracks, created_at, updated_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let audio_json: String = row.get(14)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            library_id: parse_id(row, 1)?,
            parent_id: parse_opt_id(row, 2)?,
            kind: row.get(3)?,
            name: row.get(4)?,
            year: row.get(5)?,
            season_number: row.get(6)?,
            episode_number: row.get(7)?,
            tmdb_id: row.get(8)?,
            musicbrainz_id: row.get(9)?,
            file_path: row.get(10)?,
            resolution: row.get(11)?,
            video_codec: row.get(12)?,
            video_bitrate_kbps: row.get(13)?,
            audio_tracks: serde_json::from_str(&audio_json).unwrap_or_default(),
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }
}

// ---------------------------------------------------------------------------
// QualityScoreRow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QualityScoreRow {
    pub item_id: ItemId,
    pub resolution_tier: String,
    pub tier_quality: String,
    pub needs_upgrade: bool,
    pub issues: Vec<String>,
    pub updated_at: String,
}

impl QualityScoreRow {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let issues_json: String = row.get(4)?;
        Ok(Self {
            item_id: parse_id(row, 0)?,
            resolution_tier: row.get(1)?,
            tier_quality: row.get(2)?,
            needs_upgrade: row.get(3)?,
            issues: serde_json::from_str(&issues_json).unwrap_or_default(),
            updated_at: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// CompletenessRow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompletenessRow {
    pub item_id: ItemId,
    pub scope_kind: String,
    pub owned_count: i64,
    pub total_count: i64,
    pub completeness_pct: f64,
    pub missing_items: Vec<CatalogEntry>,
    /// Empty for non-series scopes.
    pub seasons: Vec<SeasonGap>,
    pub updated_at: String,
}

impl CompletenessRow {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let missing_json: String = row.get(5)?;
        let seasons_json: String = row.get(6)?;
        Ok(Self {
            item_id: parse_id(row, 0)?,
            scope_kind: row.get(1)?,
            owned_count: row.get(2)?,
            total_count: row.get(3)?,
            completeness_pct: row.get(4)?,
            missing_items: serde_json::from_str(&missing_json).unwrap_or_default(),
            seasons: serde_json::from_str(&seasons_json).unwrap_or_default(),
            updated_at: row.get(7)?,
        })
    }
}
