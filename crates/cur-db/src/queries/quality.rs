//! Quality score persistence.

use chrono::Utc;
use cur_core::{Error, ItemId, Result};
use cur_engine::QualityScore;
use rusqlite::Connection;

use crate::models::QualityScoreRow;

const COLS: &str = "item_id, resolution_tier, tier_quality, needs_upgrade, issues, updated_at";

/// Insert or replace the quality score for an item.
pub fn upsert_quality(conn: &Connection, item_id: ItemId, score: &QualityScore) -> Result<()> {
    let issues_json =
        serde_json::to_string(&score.issues).map_err(|e| Error::database(e.to_string()))?;
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO quality_scores
            (item_id, resolution_tier, tier_quality, needs_upgrade, issues, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(item_id) DO UPDATE SET
            resolution_tier = excluded.resolution_tier,
            tier_quality = excluded.tier_quality,
            needs_upgrade = excluded.needs_upgrade,
            issues = excluded.issues,
            updated_at = excluded.updated_at",
        rusqlite::params![
            item_id.to_string(),
            score.resolution_tier.as_str(),
            score.tier_quality.as_str(),
            score.needs_upgrade,
            issues_json,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get the stored quality score for an item.
pub fn get_quality(conn: &Connection, item_id: ItemId) -> Result<Option<QualityScoreRow>> {
    let q = format!("SELECT {COLS} FROM quality_scores WHERE item_id = ?1");
    let result = conn.query_row(&q, [item_id.to_string()], QualityScoreRow::from_row);
    match result {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List items in a library whose stored score flags an upgrade.
pub fn list_upgrade_candidates(
    conn: &Connection,
    library_id: cur_core::LibraryId,
) -> Result<Vec<QualityScoreRow>> {
    let q = format!(
        "SELECT q.item_id, q.resolution_tier, q.tier_quality, q.needs_upgrade,
                q.issues, q.updated_at
         FROM quality_scores q
         JOIN items i ON i.id = q.item_id
         WHERE i.library_id = ?1 AND q.needs_upgrade = 1
         ORDER BY i.name ASC"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([library_id.to_string()], QualityScoreRow::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
