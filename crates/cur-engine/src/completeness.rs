//! Completeness analysis: owned items diffed against a canonical catalog.
//!
//! [`diff_catalog`] handles flat scopes (movie collections, discographies);
//! [`diff_series`] adds the per-season rollup for TV. Both are pure: callers
//! fetch the canonical listing from a metadata provider and pass it in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Catalog entries
// ---------------------------------------------------------------------------

/// One entry of a canonical external listing, carrying just enough display
/// metadata for a missing-items view. Doubles as the missing-item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CatalogEntry {
    /// External catalog identifier (TMDB id, MusicBrainz release-group id...).
    pub external_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<i32>,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Completeness of one scope (series, collection, or artist).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessRecord {
    pub owned_count: u64,
    pub total_count: u64,
    /// Catalog entries absent from the owned set, in catalog order.
    pub missing_items: Vec<CatalogEntry>,
    /// `owned / total * 100`; 100 when the catalog is empty, by convention,
    /// so an empty scope reads as complete rather than dividing by zero.
    pub completeness_percentage: f32,
}

/// Gap summary for one season of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SeasonGap {
    pub season: i32,
    pub total_episodes: u64,
    pub missing_episodes: u64,
    /// True when the season contributes zero owned episodes.
    pub wholly_missing: bool,
}

/// Series completeness: the flat record plus per-season rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesCompleteness {
    pub record: CompletenessRecord,
    /// One entry per season present in the catalog, ordered by season number.
    pub seasons: Vec<SeasonGap>,
}

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

fn percentage(owned: u64, total: u64) -> f32 {
    if total == 0 {
        100.0
    } else {
        owned as f32 / total as f32 * 100.0
    }
}

/// Diff an owned-identifier set against a flat canonical catalog.
///
/// `owned_count` counts catalog entries present in the owned set, so
/// `owned_count + missing_items.len() == total_count` always holds; owned
/// identifiers that the catalog does not know about (extras, bonus discs)
/// are ignored rather than inflating the percentage.
pub fn diff_catalog(owned_ids: &HashSet<String>, catalog: &[CatalogEntry]) -> CompletenessRecord {
    let missing_items: Vec<CatalogEntry> = catalog
        .iter()
        .filter(|entry| !owned_ids.contains(&entry.external_id))
        .cloned()
        .collect();

    let total_count = catalog.len() as u64;
    let owned_count = total_count - missing_items.len() as u64;

    CompletenessRecord {
        owned_count,
        total_count,
        completeness_percentage: percentage(owned_count, total_count),
        missing_items,
    }
}

/// Diff a series: flat record plus a per-season rollup flagging seasons
/// with zero owned episodes as wholly missing.
///
/// Catalog entries without a season number are grouped under season 0
/// (specials), matching how providers list them.
pub fn diff_series(owned_ids: &HashSet<String>, catalog: &[CatalogEntry]) -> SeriesCompleteness {
    let record = diff_catalog(owned_ids, catalog);

    // (total, missing) per season, ordered by season number.
    let mut per_season: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    for entry in catalog {
        let season = entry.season.unwrap_or(0);
        let counts = per_season.entry(season).or_insert((0, 0));
        counts.0 += 1;
        if !owned_ids.contains(&entry.external_id) {
            counts.1 += 1;
        }
    }

    let seasons = per_season
        .into_iter()
        .map(|(season, (total, missing))| SeasonGap {
            season,
            total_episodes: total,
            missing_episodes: missing,
            wholly_missing: total > 0 && missing == total,
        })
        .collect();

    SeriesCompleteness { record, seasons }
}
