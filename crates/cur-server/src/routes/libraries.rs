//! Library CRUD route handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use cur_core::{LibraryId, MediaType, SourceId};

use crate::context::AppContext;
use crate::error::AppError;

/// Request body for creating a library.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateLibraryRequest {
    #[schema(value_type = String)]
    pub source_id: SourceId,
    pub name: String,
    /// One of: movies, tv, music.
    pub media_type: String,
    pub path: Option<String>,
}

/// Library response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LibraryResponse {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub media_type: String,
    pub path: Option<String>,
    pub created_at: String,
}

impl LibraryResponse {
    fn from_model(lib: &cur_db::models::Library) -> Self {
        Self {
            id: lib.id.to_string(),
            source_id: lib.source_id.to_string(),
            name: lib.name.clone(),
            media_type: lib.media_type.clone(),
            path: lib.path.clone(),
            created_at: lib.created_at.clone(),
        }
    }
}

/// Optional query filter for listing libraries.
#[derive(Debug, Deserialize)]
pub struct ListLibrariesQuery {
    pub source_id: Option<SourceId>,
}

/// GET /api/libraries
#[utoipa::path(
    get,
    path = "/api/libraries",
    params(("source_id" = Option<String>, Query, description = "Filter by source")),
    responses(
        (status = 200, description = "List libraries", body = Vec<LibraryResponse>)
    )
)]
pub async fn list_libraries(
    State(ctx): State<AppContext>,
    Query(params): Query<ListLibrariesQuery>,
) -> Result<Json<Vec<LibraryResponse>>, AppError> {
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let libs = cur_db::queries::libraries::list_libraries(&conn, params.source_id)?;
    let responses: Vec<LibraryResponse> = libs.iter().map(LibraryResponse::from_model).collect();
    Ok(Json(responses))
}

/// POST /api/libraries
#[utoipa::path(
    post,
    path = "/api/libraries",
    request_body = CreateLibraryRequest,
    responses(
        (status = 201, description = "Library created", body = LibraryResponse),
        (status = 400, description = "Invalid media type"),
        (status = 404, description = "Source not found")
    )
)]
pub async fn create_library(
    State(ctx): State<AppContext>,
    Json(payload): Json<CreateLibraryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.is_empty() {
        return Err(cur_core::Error::Validation("name is required".into()).into());
    }
    let media_type = MediaType::parse(&payload.media_type).ok_or_else(|| {
        cur_core::Error::Validation(format!("Unknown media type: {}", payload.media_type))
    })?;

    let conn = cur_db::pool::get_conn(&ctx.db)?;
    if cur_db::queries::sources::get_source(&conn, payload.source_id)?.is_none() {
        return Err(cur_core::Error::not_found("source", payload.source_id).into());
    }
    let lib = cur_db::queries::libraries::create_library(
        &conn,
        payload.source_id,
        &payload.name,
        media_type,
        payload.path.as_deref(),
    )?;

    Ok((StatusCode::CREATED, Json(LibraryResponse::from_model(&lib))))
}

/// GET /api/libraries/{id}
#[utoipa::path(
    get,
    path = "/api/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    responses(
        (status = 200, description = "Library details", body = LibraryResponse),
        (status = 404, description = "Library not found")
    )
)]
pub async fn get_library(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<LibraryResponse>, AppError> {
    let library_id = parse_library_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    let lib = cur_db::queries::libraries::get_library(&conn, library_id)?
        .ok_or_else(|| cur_core::Error::not_found("library", library_id))?;
    Ok(Json(LibraryResponse::from_model(&lib)))
}

/// DELETE /api/libraries/{id}
#[utoipa::path(
    delete,
    path = "/api/libraries/{id}",
    params(("id" = String, Path, description = "Library ID")),
    responses(
        (status = 204, description = "Library deleted"),
        (status = 404, description = "Library not found")
    )
)]
pub async fn delete_library(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let library_id = parse_library_id(&id)?;
    let conn = cur_db::pool::get_conn(&ctx.db)?;
    if !cur_db::queries::libraries::delete_library(&conn, library_id)? {
        return Err(cur_core::Error::not_found("library", library_id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

fn parse_library_id(raw: &str) -> Result<LibraryId, cur_core::Error> {
    raw.parse()
        .map_err(|_| cur_core::Error::Validation("Invalid library ID".into()))
}
