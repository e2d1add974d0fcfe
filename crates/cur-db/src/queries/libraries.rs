//! Library operations.

use chrono::Utc;
use cur_core::{Error, LibraryId, MediaType, Result, SourceId};
use rusqlite::Connection;

use crate::models::Library;

const COLS: &str = "id, source_id, name, media_type, path, created_at";

/// Create a new library under a source.
pub fn create_library(
    conn: &Connection,
    source_id: SourceId,
    name: &str,
    media_type: MediaType,
    path: Option<&str>,
) -> Result<Library> {
    let id = LibraryId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO libraries (id, source_id, name, media_type, path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            source_id.to_string(),
            name,
            media_type.as_str(),
            path,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Library {
        id,
        source_id,
        name: name.to_string(),
        media_type: media_type.as_str().to_string(),
        path: path.map(String::from),
        created_at: now,
    })
}

/// Get a library by ID.
pub fn get_library(conn: &Connection, id: LibraryId) -> Result<Option<Library>> {
    let q = format!("SELECT {COLS} FROM libraries WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Library::from_row);
    match result {
        Ok(l) => Ok(Some(l)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all libraries, optionally filtered by source.
pub fn list_libraries(conn: &Connection, source_id: Option<SourceId>) -> Result<Vec<Library>> {
    let (q, params): (String, Vec<String>) = match source_id {
        Some(sid) => (
            format!("SELECT {COLS} FROM libraries WHERE source_id = ?1 ORDER BY name ASC"),
            vec![sid.to_string()],
        ),
        None => (
            format!("SELECT {COLS} FROM libraries ORDER BY name ASC"),
            vec![],
        ),
    };

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), Library::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete a library. Items cascade.
pub fn delete_library(conn: &Connection, id: LibraryId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM libraries WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::sources::create_source;
    use cur_core::SourceKind;

    #[test]
    fn test_create_and_list() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let src = create_source(&conn, "NAS", SourceKind::Local, None, Some("/mnt")).unwrap();
        let lib = create_library(&conn, src.id, "Movies", MediaType::Movies, Some("/mnt/movies"))
            .unwrap();

        let fetched = get_library(&conn, lib.id).unwrap().unwrap();
        assert_eq!(fetched.media_type, "movies");
        assert_eq!(fetched.source_id, src.id);

        let all = list_libraries(&conn, Some(src.id)).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_create_requires_existing_source() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let result = create_library(&conn, SourceId::new(), "Orphan", MediaType::Tv, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_cascades_from_source() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let src = create_source(&conn, "NAS", SourceKind::Local, None, None).unwrap();
        let lib = create_library(&conn, src.id, "TV", MediaType::Tv, None).unwrap();

        crate::queries::sources::delete_source(&conn, src.id).unwrap();
        assert!(get_library(&conn, lib.id).unwrap().is_none());
    }
}
