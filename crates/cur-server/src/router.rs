//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, and the OpenAPI document.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::scheduler::get_state,
        routes::scheduler::get_history,
        routes::scheduler::submit_job,
        routes::scheduler::pause,
        routes::scheduler::resume,
        routes::scheduler::cancel_current,
        routes::scheduler::remove_queued,
        routes::scheduler::reorder_queue,
        routes::scheduler::clear_queue,
        routes::scheduler::clear_history,
        routes::sources::list_sources,
        routes::sources::create_source,
        routes::sources::get_source,
        routes::sources::set_source_enabled,
        routes::sources::delete_source,
        routes::libraries::list_libraries,
        routes::libraries::create_library,
        routes::libraries::get_library,
        routes::libraries::delete_library,
        routes::items::list_items,
        routes::items::get_item,
        routes::items::get_quality,
        routes::items::get_completeness,
        routes::items::report_tech_info,
        routes::config::get_quality_thresholds,
        routes::config::set_quality_thresholds,
    ),
    components(schemas(
        routes::scheduler::ReorderRequest,
        routes::sources::SourceResponse,
        routes::sources::CreateSourceRequest,
        routes::sources::SetEnabledRequest,
        routes::libraries::LibraryResponse,
        routes::libraries::CreateLibraryRequest,
        routes::items::ItemResponse,
        routes::items::QualityResponse,
        routes::items::CompletenessResponse,
        routes::items::TechReportRequest,
        cur_engine::AudioTrackInfo,
        crate::scheduler::SchedulerSnapshot,
        crate::scheduler::job::Job,
        crate::scheduler::job::JobDescription,
        crate::scheduler::job::JobKind,
        crate::scheduler::job::JobStatus,
        crate::scheduler::job::JobScope,
        crate::scheduler::job::JobProgress,
        crate::scheduler::job::ScanSummary,
        cur_core::config::QualityThresholds,
        cur_core::config::TierCutoffs,
        cur_engine::CatalogEntry,
        cur_engine::SeasonGap,
    ))
)]
struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Scheduler
        .route("/scheduler", get(routes::scheduler::get_state))
        .route("/scheduler/history", get(routes::scheduler::get_history))
        .route("/scheduler/history", delete(routes::scheduler::clear_history))
        .route("/scheduler/jobs", post(routes::scheduler::submit_job))
        .route("/scheduler/pause", post(routes::scheduler::pause))
        .route("/scheduler/resume", post(routes::scheduler::resume))
        .route(
            "/scheduler/current/cancel",
            post(routes::scheduler::cancel_current),
        )
        .route(
            "/scheduler/queue/order",
            put(routes::scheduler::reorder_queue),
        )
        .route(
            "/scheduler/queue/{id}",
            delete(routes::scheduler::remove_queued),
        )
        .route("/scheduler/queue", delete(routes::scheduler::clear_queue))
        // Sources
        .route("/sources", get(routes::sources::list_sources))
        .route("/sources", post(routes::sources::create_source))
        .route("/sources/{id}", get(routes::sources::get_source))
        .route("/sources/{id}", delete(routes::sources::delete_source))
        .route(
            "/sources/{id}/enabled",
            put(routes::sources::set_source_enabled),
        )
        // Libraries
        .route("/libraries", get(routes::libraries::list_libraries))
        .route("/libraries", post(routes::libraries::create_library))
        .route("/libraries/{id}", get(routes::libraries::get_library))
        .route("/libraries/{id}", delete(routes::libraries::delete_library))
        // Items
        .route("/items", get(routes::items::list_items))
        .route("/items/tech", put(routes::items::report_tech_info))
        .route("/items/{id}", get(routes::items::get_item))
        .route("/items/{id}/quality", get(routes::items::get_quality))
        .route(
            "/items/{id}/completeness",
            get(routes::items::get_completeness),
        )
        // Config
        .route(
            "/config/quality",
            get(routes::config::get_quality_thresholds)
                .put(routes::config::set_quality_thresholds),
        )
        // SSE Events
        .route("/events", get(routes::events::events_handler));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
