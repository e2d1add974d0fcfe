//! Completeness record persistence.

use chrono::Utc;
use cur_core::{Error, ItemId, Result};
use cur_engine::{CompletenessRecord, SeasonGap};
use rusqlite::Connection;

use crate::models::CompletenessRow;

const COLS: &str = "item_id, scope_kind, owned_count, total_count,
    completeness_pct, missing_items, seasons, updated_at";

/// Insert or replace the completeness record for a scope item.
///
/// `seasons` is empty for flat scopes (collections, discographies).
pub fn upsert_completeness(
    conn: &Connection,
    item_id: ItemId,
    scope_kind: &str,
    record: &CompletenessRecord,
    seasons: &[SeasonGap],
) -> Result<()> {
    let missing_json =
        serde_json::to_string(&record.missing_items).map_err(|e| Error::database(e.to_string()))?;
    let seasons_json =
        serde_json::to_string(seasons).map_err(|e| Error::database(e.to_string()))?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO completeness_records
            (item_id, scope_kind, owned_count, total_count, completeness_pct,
             missing_items, seasons, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(item_id) DO UPDATE SET
            scope_kind = excluded.scope_kind,
            owned_count = excluded.owned_count,
            total_count = excluded.total_count,
            completeness_pct = excluded.completeness_pct,
            missing_items = excluded.missing_items,
            seasons = excluded.seasons,
            updated_at = excluded.updated_at",
        rusqlite::params![
            item_id.to_string(),
            scope_kind,
            record.owned_count as i64,
            record.total_count as i64,
            record.completeness_percentage as f64,
            missing_json,
            seasons_json,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get the stored completeness record for a scope item.
pub fn get_completeness(conn: &Connection, item_id: ItemId) -> Result<Option<CompletenessRow>> {
    let q = format!("SELECT {COLS} FROM completeness_records WHERE item_id = ?1");
    let result = conn.query_row(&q, [item_id.to_string()], CompletenessRow::from_row);
    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List incomplete scopes in a library, most incomplete first.
pub fn list_incomplete(
    conn: &Connection,
    library_id: cur_core::LibraryId,
) -> Result<Vec<CompletenessRow>> {
    let q = format!(
        "SELECT c.item_id, c.scope_kind, c.owned_count, c.total_count,
                c.completeness_pct, c.missing_items, c.seasons, c.updated_at
         FROM completeness_records c
         JOIN items i ON i.id = c.item_id
         WHERE i.library_id = ?1 AND c.completeness_pct < 100.0
         ORDER BY c.completeness_pct ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([library_id.to_string()], CompletenessRow::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::{items::{insert_item, NewItem}, libraries::create_library, sources::create_source};
    use cur_core::{ItemKind, MediaType, SourceKind};
    use cur_engine::{diff_series, CatalogEntry};
    use std::collections::HashSet;

    fn insert_series(conn: &Connection) -> (cur_core::LibraryId, ItemId) {
        let src = create_source(conn, "NAS", SourceKind::Local, None, None).unwrap();
        let lib = create_library(conn, src.id, "TV", MediaType::Tv, None).unwrap();
        let item = insert_item(
            conn,
            lib.id,
            ItemKind::Series,
            &NewItem {
                name: "The Wire",
                ..Default::default()
            },
        )
        .unwrap();
        (lib.id, item.id)
    }

    fn sample_result() -> cur_engine::SeriesCompleteness {
        let catalog: Vec<CatalogEntry> = (1..=4)
            .map(|n| CatalogEntry {
                external_id: format!("s1e{n}"),
                title: format!("Episode {n}"),
                year: None,
                season: Some(1),
                episode: Some(n),
            })
            .collect();
        let owned: HashSet<String> = ["s1e1", "s1e2"].iter().map(|s| s.to_string()).collect();
        diff_series(&owned, &catalog)
    }

    #[test]
    fn test_roundtrip_with_seasons() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (_, series_id) = insert_series(&conn);

        let result = sample_result();
        upsert_completeness(&conn, series_id, "series", &result.record, &result.seasons).unwrap();

        let row = get_completeness(&conn, series_id).unwrap().unwrap();
        assert_eq!(row.owned_count, 2);
        assert_eq!(row.total_count, 4);
        assert_eq!(row.missing_items.len(), 2);
        assert_eq!(row.seasons.len(), 1);
        assert_eq!(row.seasons[0].missing_episodes, 2);
    }

    #[test]
    fn test_upsert_replaces() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (_, series_id) = insert_series(&conn);

        let result = sample_result();
        upsert_completeness(&conn, series_id, "series", &result.record, &result.seasons).unwrap();

        // Re-analysis after acquiring the rest of the season.
        let complete = diff_series(
            &["s1e1", "s1e2", "s1e3", "s1e4"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            &(1..=4)
                .map(|n| CatalogEntry {
                    external_id: format!("s1e{n}"),
                    title: format!("Episode {n}"),
                    year: None,
                    season: Some(1),
                    episode: Some(n),
                })
                .collect::<Vec<_>>(),
        );
        upsert_completeness(&conn, series_id, "series", &complete.record, &complete.seasons)
            .unwrap();

        let row = get_completeness(&conn, series_id).unwrap().unwrap();
        assert_eq!(row.completeness_pct, 100.0);
        assert!(row.missing_items.is_empty());
    }

    #[test]
    fn test_list_incomplete_sorted() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        let (lib_id, a) = insert_series(&conn);
        let b = insert_item(
            &conn,
            lib_id,
            ItemKind::Series,
            &NewItem {
                name: "Deadwood",
                ..Default::default()
            },
        )
        .unwrap()
        .id;

        let half = sample_result();
        upsert_completeness(&conn, a, "series", &half.record, &half.seasons).unwrap();

        let catalog = vec![CatalogEntry {
            external_id: "x".into(),
            title: "Pilot".into(),
            year: None,
            season: Some(1),
            episode: Some(1),
        }];
        let none = diff_series(&HashSet::new(), &catalog);
        upsert_completeness(&conn, b, "series", &none.record, &none.seasons).unwrap();

        let rows = list_incomplete(&conn, lib_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item_id, b);
        assert_eq!(rows[1].item_id, a);
    }
}
