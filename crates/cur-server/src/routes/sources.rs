//! Media source CRUD route handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use cur_core::{SourceId, SourceKind};

use crate::context::AppContext;
use crate::error::AppError;

/// Request body for registering a source.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateSourceRequest {
    pub name: String,
    /// One of: plex, jellyfin, emby, kodi, local.
    pub kind: String,
    pub url: Option<String>,
    pub root_path: Option<String>,
}

/// Source response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceResponse {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub url: Option<String>,
    pub root_path: Option<String>,
    pub enabled: bool,
    pub created_at: String,
}

impl SourceResponse {
    fn from_model(source: &cur_db::models::Source) -> Self {
        Self {
            id: source.id.to_string(),
            name: source.name.clone(),
            kind: source.kind.clone(),
            url: source.url.clone(),
            root_path: source.root_path.clone(),
            enabled: source.enabled,
            created_at: source.created_at.clone(),
        }
    }
}

/// GET /api/sources
#[utoipa::path(
    get,
    path = "/api/sources",
    responses(
        (status = 200, description = "List all sources", body = Vec<SourceResponse>)
    )
)]
pub async fn list_sources(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<SourceResponse>>, AppError> {
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let sources = cur_db::queries::sources::list_sources(&conn)?;
    let responses: Vec<SourceResponse> = sources.iter().map(SourceResponse::from_model).collect();
    Ok(Json(responses))
}

/// POST /api/sources
#[utoipa::path(
    post,
    path = "/api/sources",
    request_body = CreateSourceRequest,
    responses(
        (status = 201, description = "Source registered", body = SourceResponse),
        (status = 400, description = "Invalid source kind")
    )
)]
pub async fn create_source(
    State(ctx): State<AppContext>,
    Json(payload): Json<CreateSourceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.is_empty() {
        return Err(cur_core::Error::Validation("name is required".into()).into());
    }
    let kind = SourceKind::parse(&payload.kind).ok_or_else(|| {
        cur_core::Error::Validation(format!("Unknown source kind: {}", payload.kind))
    })?;

    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let source = cur_db::queries::sources::create_source(
        &conn,
        &payload.name,
        kind,
        payload.url.as_deref(),
        payload.root_path.as_deref(),
    )?;

    Ok((StatusCode::CREATED, Json(SourceResponse::from_model(&source))))
}

/// GET /api/sources/{id}
#[utoipa::path(
    get,
    path = "/api/sources/{id}",
    params(("id" = String, Path, description = "Source ID")),
    responses(
        (status = 200, description = "Source details", body = SourceResponse),
        (status = 404, description = "Source not found")
    )
)]
pub async fn get_source(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<SourceResponse>, AppError> {
    let source_id = parse_source_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let source = cur_db::queries::sources::get_source(&conn, source_id)?
        .ok_or_else(|| cur_core::Error::not_found("source", source_id))?;
    Ok(Json(SourceResponse::from_model(&source)))
}

/// Request body for toggling a source.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

/// PUT /api/sources/{id}/enabled
#[utoipa::path(
    put,
    path = "/api/sources/{id}/enabled",
    params(("id" = String, Path, description = "Source ID")),
    request_body = SetEnabledRequest,
    responses(
        (status = 200, description = "Source updated", body = SourceResponse),
        (status = 404, description = "Source not found")
    )
)]
pub async fn set_source_enabled(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(payload): Json<SetEnabledRequest>,
) -> Result<Json<SourceResponse>, AppError> {
    let source_id = parse_source_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    if !cur_db::queries::sources::set_source_enabled(&conn, source_id, payload.enabled)? {
        return Err(cur_core::Error::not_found("source", source_id).into());
    }
    let source = cur_db::queries::sources::get_source(&conn, source_id)?
        .ok_or_else(|| cur_core::Error::not_found("source", source_id))?;
    Ok(Json(SourceResponse::from_model(&source)))
}

/// DELETE /api/sources/{id}
#[utoipa::path(
    delete,
    path = "/api/sources/{id}",
    params(("id" = String, Path, description = "Source ID")),
    responses(
        (status = 204, description = "Source deleted"),
        (status = 404, description = "Source not found")
    )
)]
pub async fn delete_source(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let source_id = parse_source_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    if !cur_db::queries::sources::delete_source(&conn, source_id)? {
        return Err(cur_core::Error::not_found("source", source_id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

fn parse_source_id(raw: &str) -> Result<SourceId, cur_core::Error> {
    raw.parse()
        .map_err(|_| cur_core::Error::Validation("Invalid source ID".into()))
}
