//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use cur_core::{Error, Result};
use rusqlite::Connection;

/// V1: initial schema -- creates all core tables and indexes.
const V1_INITIAL: &str = r#"
-- Media sources (servers or local folders)
CREATE TABLE sources (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    url        TEXT,
    root_path  TEXT,
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

-- Libraries within a source
CREATE TABLE libraries (
    id         TEXT PRIMARY KEY,
    source_id  TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    media_type TEXT NOT NULL,
    path       TEXT,
    created_at TEXT NOT NULL
);

-- Items (movies, series, episodes, artists, albums, collections)
CREATE TABLE items (
    id                 TEXT PRIMARY KEY,
    library_id         TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    parent_id          TEXT REFERENCES items(id),
    kind               TEXT NOT NULL,
    name               TEXT NOT NULL,
    year               INTEGER,
    season_number      INTEGER,
    episode_number     INTEGER,
    tmdb_id            TEXT,
    musicbrainz_id     TEXT,
    file_path          TEXT UNIQUE,
    resolution         TEXT,
    video_codec        TEXT,
    video_bitrate_kbps INTEGER,
    audio_tracks       TEXT NOT NULL DEFAULT '[]',
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

-- Quality scores, one row per analyzed item (upsert semantics)
CREATE TABLE quality_scores (
    item_id         TEXT PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
    resolution_tier TEXT NOT NULL,
    tier_quality    TEXT NOT NULL,
    needs_upgrade   INTEGER NOT NULL DEFAULT 0,
    issues          TEXT NOT NULL DEFAULT '[]',
    updated_at      TEXT NOT NULL
);

-- Completeness records, one row per analyzed scope (upsert semantics)
CREATE TABLE completeness_records (
    item_id          TEXT PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
    scope_kind       TEXT NOT NULL,
    owned_count      INTEGER NOT NULL,
    total_count      INTEGER NOT NULL,
    completeness_pct REAL NOT NULL,
    missing_items    TEXT NOT NULL DEFAULT '[]',
    seasons          TEXT NOT NULL DEFAULT '[]',
    updated_at       TEXT NOT NULL
);

-- Indexes
CREATE INDEX idx_libraries_source  ON libraries(source_id);
CREATE INDEX idx_items_library     ON items(library_id);
CREATE INDEX idx_items_parent      ON items(parent_id);
CREATE INDEX idx_items_kind        ON items(library_id, kind);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
