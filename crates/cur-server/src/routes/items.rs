//! Item route handlers, including quality and completeness lookups.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use cur_core::events::{EventCategory, EventPayload};
use cur_core::{ItemId, LibraryId};
use cur_engine::{classify, AudioTrackInfo, CatalogEntry, MediaTechInfo, SeasonGap};

use crate::context::AppContext;
use crate::error::AppError;

/// Item response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ItemResponse {
    pub id: String,
    pub library_id: String,
    pub parent_id: Option<String>,
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
    pub created_at: String,
    pub updated_at: String,
}

impl ItemResponse {
    fn from_model(item: &cur_db::models::Item) -> Self {
        Self {
            id: item.id.to_string(),
            library_id: item.library_id.to_string(),
            parent_id: item.parent_id.map(|p| p.to_string()),
            kind: item.kind.clone(),
            name: item.name.clone(),
            year: item.year,
            season_number: item.season_number,
            episode_number: item.episode_number,
            tmdb_id: item.tmdb_id.clone(),
            musicbrainz_id: item.musicbrainz_id.clone(),
            file_path: item.file_path.clone(),
            resolution: item.resolution.clone(),
            video_codec: item.video_codec.clone(),
            video_bitrate_kbps: item.video_bitrate_kbps,
            created_at: item.created_at.clone(),
            updated_at: item.updated_at.clone(),
        }
    }
}

/// Query filter for listing items.
#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub library_id: LibraryId,
}

/// GET /api/items
#[utoipa::path(
    get,
    path = "/api/items",
    params(("library_id" = String, Query, description = "Library to list")),
    responses(
        (status = 200, description = "Items in the library", body = Vec<ItemResponse>)
    )
)]
pub async fn list_items(
    State(ctx): State<AppContext>,
    Query(params): Query<ListItemsQuery>,
) -> Result<Json<Vec<ItemResponse>>, AppError> {
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let items = cur_db::queries::items::list_by_library(&conn, params.library_id)?;
    let responses: Vec<ItemResponse> = items.iter().map(ItemResponse::from_model).collect();
    Ok(Json(responses))
}

/// GET /api/items/{id}
#[utoipa::path(
    get,
    path = "/api/items/{id}",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item details", body = ItemResponse),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_item(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, AppError> {
    let item_id = parse_item_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let item = cur_db::queries::items::get_item(&conn, item_id)?
        .ok_or_else(|| cur_core::Error::not_found("item", item_id))?;
    Ok(Json(ItemResponse::from_model(&item)))
}

/// Quality score response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct QualityResponse {
    pub item_id: String,
    pub resolution_tier: String,
    pub tier_quality: String,
    pub needs_upgrade: bool,
    pub issues: Vec<String>,
    pub updated_at: String,
}

/// GET /api/items/{id}/quality
#[utoipa::path(
    get,
    path = "/api/items/{id}/quality",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Quality score for the item", body = QualityResponse),
        (status = 404, description = "Item has no quality score")
    )
)]
pub async fn get_quality(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<QualityResponse>, AppError> {
    let item_id = parse_item_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let row = cur_db::queries::quality::get_quality(&conn, item_id)?
        .ok_or_else(|| cur_core::Error::not_found("quality score", item_id))?;
    Ok(Json(QualityResponse {
        item_id: row.item_id.to_string(),
        resolution_tier: row.resolution_tier,
        tier_quality: row.tier_quality,
        needs_upgrade: row.needs_upgrade,
        issues: row.issues,
        updated_at: row.updated_at,
    }))
}

/// Technical metadata report for one media file.
///
/// Submitted by an external analysis tool (a media server hook, a batch
/// script reading container headers); keyed by file path because that is
/// what the tool knows.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TechReportRequest {
    pub file_path: String,
    pub resolution: Option<String>,
    pub video_codec: Option<String>,
    pub video_bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrackInfo>,
}

/// PUT /api/items/tech
///
/// Stores the reported metadata on the matching item and immediately
/// reclassifies it under the current thresholds, so the score never trails
/// the metadata it was computed from.
#[utoipa::path(
    put,
    path = "/api/items/tech",
    request_body = TechReportRequest,
    responses(
        (status = 200, description = "Metadata stored and item reclassified", body = QualityResponse),
        (status = 404, description = "No item has that file path")
    )
)]
pub async fn report_tech_info(
    State(ctx): State<AppContext>,
    Json(report): Json<TechReportRequest>,
) -> Result<Json<QualityResponse>, AppError> {
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let item = cur_db::queries::items::find_by_file_path(&conn, &report.file_path)?
        .ok_or_else(|| cur_core::Error::not_found("item", &report.file_path))?;

    cur_db::queries::items::update_tech_info(
        &conn,
        item.id,
        report.resolution.as_deref(),
        report.video_codec.as_deref(),
        report.video_bitrate_kbps,
        &report.audio_tracks,
    )?;

    let score = classify(
        &MediaTechInfo {
            resolution: report.resolution,
            video_codec: report.video_codec,
            video_bitrate_kbps: report.video_bitrate_kbps,
            audio_tracks: report.audio_tracks,
        },
        &ctx.config_store.quality_thresholds(),
    );
    cur_db::queries::quality::upsert_quality(&conn, item.id, &score)?;
    ctx.event_bus.broadcast(
        EventCategory::User,
        EventPayload::QualityScored {
            item_id: item.id,
            tier_quality: score.tier_quality.as_str().to_string(),
            needs_upgrade: score.needs_upgrade,
        },
    );

    let row = cur_db::queries::quality::get_quality(&conn, item.id)?
        .ok_or_else(|| cur_core::Error::not_found("quality score", item.id))?;
    Ok(Json(QualityResponse {
        item_id: row.item_id.to_string(),
        resolution_tier: row.resolution_tier,
        tier_quality: row.tier_quality,
        needs_upgrade: row.needs_upgrade,
        issues: row.issues,
        updated_at: row.updated_at,
    }))
}

/// Completeness record response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CompletenessResponse {
    pub item_id: String,
    pub scope_kind: String,
    pub owned_count: i64,
    pub total_count: i64,
    pub completeness_pct: f64,
    pub missing_items: Vec<CatalogEntry>,
    pub seasons: Vec<SeasonGap>,
    pub updated_at: String,
}

/// GET /api/items/{id}/completeness
#[utoipa::path(
    get,
    path = "/api/items/{id}/completeness",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Completeness record", body = CompletenessResponse),
        (status = 404, description = "Item has no completeness record")
    )
)]
pub async fn get_completeness(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<CompletenessResponse>, AppError> {
    let item_id = parse_item_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let row = cur_db::queries::completeness::get_completeness(&conn, item_id)?
        .ok_or_else(|| cur_core::Error::not_found("completeness record", item_id))?;
    Ok(Json(CompletenessResponse {
        item_id: row.item_id.to_string(),
        scope_kind: row.scope_kind,
        owned_count: row.owned_count,
        total_count: row.total_count,
        completeness_pct: row.completeness_pct,
        missing_items: row.missing_items,
        seasons: row.seasons,
        updated_at: row.updated_at,
    }))
}

fn parse_item_id(raw: &str) -> Result<ItemId, cur_core::Error> {
    raw.parse()
        .map_err(|_| cur_core::Error::Validation("Invalid item ID".into()))
}
