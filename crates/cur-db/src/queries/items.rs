//! Library item operations.

use chrono::Utc;
use cur_core::{Error, ItemId, ItemKind, LibraryId, Result};
use cur_engine::AudioTrackInfo;
use rusqlite::Connection;

use crate::models::Item;

const COLS: &str = "id, library_id, parent_id, kind, name, year, season_number,
    episode_number, tmdb_id, musicbrainz_id, file_path, resolution,
    video_codec, video_bitrate_kbps, audio_tracks, created_at, updated_at";

/// Fields for inserting a new item.
#[derive(Debug, Clone, Default)]
pub struct NewItem<'a> {
    pub parent_id: Option<ItemId>,
    pub name: &'a str,
    pub year: Option<i32>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub tmdb_id: Option<&'a str>,
    pub musicbrainz_id: Option<&'a str>,
    pub file_path: Option<&'a str>,
}

/// Insert a new item into a library.
pub fn insert_item(
    conn: &Connection,
    library_id: LibraryId,
    kind: ItemKind,
    new: &NewItem,
) -> Result<Item> {
    let id = ItemId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO items (id, library_id, parent_id, kind, name, year,
            season_number, episode_number, tmdb_id, musicbrainz_id, file_path,
            audio_tracks, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, '[]', ?12, ?12)",
        rusqlite::params![
            id.to_string(),
            library_id.to_string(),
            new.parent_id.map(|p| p.to_string()),
            kind.as_str(),
            new.name,
            new.year,
            new.season_number,
            new.episode_number,
            new.tmdb_id,
            new.musicbrainz_id,
            new.file_path,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Item {
        id,
        library_id,
        parent_id: new.parent_id,
        kind: kind.as_str().to_string(),
        name: new.name.to_string(),
        year: new.year,
        season_number: new.season_number,
        episode_number: new.episode_number,
        tmdb_id: new.tmdb_id.map(String::from),
        musicbrainz_id: new.musicbrainz_id.map(String::from),
        file_path: new.file_path.map(String::from),
        resolution: None,
        video_codec: None,
        video_bitrate_kbps: None,
        audio_tracks: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get an item by ID.
pub fn get_item(conn: &Connection, id: ItemId) -> Result<Option<Item>> {
    let q = format!("SELECT {COLS} FROM items WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Item::from_row);
    match result {
        Ok(i) => Ok(Some(i)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Find an item by its (unique) file path.
pub fn find_by_file_path(conn: &Connection, file_path: &str) -> Result<Option<Item>> {
    let q = format!("SELECT {COLS} FROM items WHERE file_path = ?1");
    let result = conn.query_row(&q, [file_path], Item::from_row);
    match result {
        Ok(i) => Ok(Some(i)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Find an item by name within a library, filtered by kind.
pub fn find_by_name(
    conn: &Connection,
    library_id: LibraryId,
    kind: ItemKind,
    name: &str,
) -> Result<Option<Item>> {
    let q = format!(
        "SELECT {COLS} FROM items WHERE library_id = ?1 AND kind = ?2 AND name = ?3"
    );
    let result = conn.query_row(
        &q,
        rusqlite::params![library_id.to_string(), kind.as_str(), name],
        Item::from_row,
    );
    match result {
        Ok(i) => Ok(Some(i)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List every item in a library, ordered by name.
pub fn list_by_library(conn: &Connection, library_id: LibraryId) -> Result<Vec<Item>> {
    let q = format!("SELECT {COLS} FROM items WHERE library_id = ?1 ORDER BY name ASC");
    query_items(conn, &q, [library_id.to_string()])
}

/// List items of one kind in a library, ordered by name.
pub fn list_by_kind(conn: &Connection, library_id: LibraryId, kind: ItemKind) -> Result<Vec<Item>> {
    let q = format!(
        "SELECT {COLS} FROM items WHERE library_id = ?1 AND kind = ?2 ORDER BY name ASC"
    );
    query_items(
        conn,
        &q,
        rusqlite::params![library_id.to_string(), kind.as_str()],
    )
}

/// List items in a library that are backed by a media file.
pub fn list_file_items(conn: &Connection, library_id: LibraryId) -> Result<Vec<Item>> {
    let q = format!(
        "SELECT {COLS} FROM items
         WHERE library_id = ?1 AND file_path IS NOT NULL ORDER BY file_path ASC"
    );
    query_items(conn, &q, [library_id.to_string()])
}

/// List direct children of an item, ordered by season then episode.
pub fn list_children(conn: &Connection, parent_id: ItemId) -> Result<Vec<Item>> {
    let q = format!(
        "SELECT {COLS} FROM items WHERE parent_id = ?1
         ORDER BY season_number ASC, episode_number ASC, name ASC"
    );
    query_items(conn, &q, [parent_id.to_string()])
}

/// Update an item's technical metadata (resolution, codecs, audio tracks).
pub fn update_tech_info(
    conn: &Connection,
    id: ItemId,
    resolution: Option<&str>,
    video_codec: Option<&str>,
    video_bitrate_kbps: Option<u32>,
    audio_tracks: &[AudioTrackInfo],
) -> Result<bool> {
    let audio_json =
        serde_json::to_string(audio_tracks).map_err(|e| Error::database(e.to_string()))?;
    let now = Utc::now().to_rfc3339();

    let n = conn
        .execute(
            "UPDATE items SET resolution = ?1, video_codec = ?2,
                video_bitrate_kbps = ?3, audio_tracks = ?4, updated_at = ?5
             WHERE id = ?6",
            rusqlite::params![
                resolution,
                video_codec,
                video_bitrate_kbps,
                audio_json,
                &now,
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete an item. Children and analysis rows cascade.
pub fn delete_item(conn: &Connection, id: ItemId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM items WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

fn query_items<P: rusqlite::Params>(conn: &Connection, q: &str, params: P) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare(q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params, Item::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
