//! Media source operations.

use chrono::Utc;
use cur_core::{Error, Result, SourceId, SourceKind};
use rusqlite::Connection;

use crate::models::Source;

const COLS: &str = "id, name, kind, url, root_path, enabled, created_at";

/// Create a new source.
pub fn create_source(
    conn: &Connection,
    name: &str,
    kind: SourceKind,
    url: Option<&str>,
    root_path: Option<&str>,
) -> Result<Source> {
    let id = SourceId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO sources (id, name, kind, url, root_path, enabled, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        rusqlite::params![id.to_string(), name, kind.as_str(), url, root_path, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Source {
        id,
        name: name.to_string(),
        kind: kind.as_str().to_string(),
        url: url.map(String::from),
        root_path: root_path.map(String::from),
        enabled: true,
        created_at: now,
    })
}

/// Get a source by ID.
pub fn get_source(conn: &Connection, id: SourceId) -> Result<Option<Source>> {
    let q = format!("SELECT {COLS} FROM sources WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Source::from_row);
    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all sources ordered by name.
pub fn list_sources(conn: &Connection) -> Result<Vec<Source>> {
    let q = format!("SELECT {COLS} FROM sources ORDER BY name ASC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Source::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Enable or disable a source.
pub fn set_source_enabled(conn: &Connection, id: SourceId, enabled: bool) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE sources SET enabled = ?1 WHERE id = ?2",
            rusqlite::params![enabled, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a source. Libraries and items cascade.
pub fn delete_source(conn: &Connection, id: SourceId) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM sources WHERE id = ?1",
            [id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};

    #[test]
    fn test_create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let src = create_source(&conn, "Living Room", SourceKind::Plex, Some("http://plex:32400"), None)
            .unwrap();
        let fetched = get_source(&conn, src.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Living Room");
        assert_eq!(fetched.kind, "plex");
        assert!(fetched.enabled);
    }

    #[test]
    fn test_get_missing_is_none() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();
        assert!(get_source(&conn, SourceId::new()).unwrap().is_none());
    }

    #[test]
    fn test_list_ordered_by_name() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        create_source(&conn, "Zeta", SourceKind::Local, None, Some("/mnt/z")).unwrap();
        create_source(&conn, "Alpha", SourceKind::Jellyfin, Some("http://jf"), None).unwrap();

        let all = list_sources(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Alpha");
    }

    #[test]
    fn test_disable_and_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let src = create_source(&conn, "NAS", SourceKind::Local, None, Some("/mnt/media")).unwrap();
        assert!(set_source_enabled(&conn, src.id, false).unwrap());
        assert!(!get_source(&conn, src.id).unwrap().unwrap().enabled);

        assert!(delete_source(&conn, src.id).unwrap());
        assert!(get_source(&conn, src.id).unwrap().is_none());
        assert!(!delete_source(&conn, src.id).unwrap());
    }
}
