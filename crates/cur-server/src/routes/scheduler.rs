//! Scheduler route handlers, mapping 1:1 to the scheduler operations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use cur_core::JobId;

use crate::context::AppContext;
use crate::error::AppError;
use crate::scheduler::job::{Job, JobDescription};
use crate::scheduler::SchedulerSnapshot;

/// GET /api/scheduler
#[utoipa::path(
    get,
    path = "/api/scheduler",
    responses(
        (status = 200, description = "Scheduler state snapshot", body = SchedulerSnapshot)
    )
)]
pub async fn get_state(State(ctx): State<AppContext>) -> Json<SchedulerSnapshot> {
    Json(ctx.scheduler.snapshot())
}

/// GET /api/scheduler/history
#[utoipa::path(
    get,
    path = "/api/scheduler/history",
    responses(
        (status = 200, description = "Terminal jobs, newest first", body = Vec<Job>)
    )
)]
pub async fn get_history(State(ctx): State<AppContext>) -> Json<Vec<Job>> {
    Json(ctx.scheduler.history())
}

/// POST /api/scheduler/jobs
#[utoipa::path(
    post,
    path = "/api/scheduler/jobs",
    request_body = JobDescription,
    responses(
        (status = 202, description = "Job enqueued"),
        (status = 400, description = "Malformed job scope")
    )
)]
pub async fn submit_job(
    State(ctx): State<AppContext>,
    Json(desc): Json<JobDescription>,
) -> Result<impl IntoResponse, AppError> {
    let id = ctx.scheduler.enqueue(desc)?;
    Ok((StatusCode::ACCEPTED, Json(json!({"job_id": id}))))
}

/// POST /api/scheduler/pause
#[utoipa::path(
    post,
    path = "/api/scheduler/pause",
    responses((status = 200, description = "Dispatch paused"))
)]
pub async fn pause(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    ctx.scheduler.pause();
    Json(json!({"paused": true}))
}

/// POST /api/scheduler/resume
#[utoipa::path(
    post,
    path = "/api/scheduler/resume",
    responses((status = 200, description = "Dispatch resumed"))
)]
pub async fn resume(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    ctx.scheduler.resume();
    Json(json!({"paused": false}))
}

/// POST /api/scheduler/current/cancel
#[utoipa::path(
    post,
    path = "/api/scheduler/current/cancel",
    responses(
        (status = 202, description = "Cancellation requested"),
        (status = 404, description = "No job running")
    )
)]
pub async fn cancel_current(
    State(ctx): State<AppContext>,
) -> Result<impl IntoResponse, AppError> {
    if !ctx.scheduler.cancel_current() {
        return Err(cur_core::Error::not_found("running job", "current").into());
    }
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "cancelling"}))))
}

/// DELETE /api/scheduler/queue/{id}
#[utoipa::path(
    delete,
    path = "/api/scheduler/queue/{id}",
    params(("id" = String, Path, description = "Queued job ID")),
    responses(
        (status = 204, description = "Job removed from queue"),
        (status = 404, description = "Job not in queue")
    )
)]
pub async fn remove_queued(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| cur_core::Error::Validation("Invalid job ID".into()))?;
    if !ctx.scheduler.remove_from_queue(job_id) {
        return Err(cur_core::Error::not_found("queued job", job_id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for queue reordering.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReorderRequest {
    /// Desired id order; unknown ids are ignored and any queued job missing
    /// from the list keeps its position at the end.
    #[schema(value_type = Vec<String>)]
    pub order: Vec<JobId>,
}

/// PUT /api/scheduler/queue/order
#[utoipa::path(
    put,
    path = "/api/scheduler/queue/order",
    request_body = ReorderRequest,
    responses((status = 200, description = "Queue reordered", body = SchedulerSnapshot))
)]
pub async fn reorder_queue(
    State(ctx): State<AppContext>,
    Json(req): Json<ReorderRequest>,
) -> Json<SchedulerSnapshot> {
    ctx.scheduler.reorder_queue(&req.order);
    Json(ctx.scheduler.snapshot())
}

/// DELETE /api/scheduler/queue
#[utoipa::path(
    delete,
    path = "/api/scheduler/queue",
    responses((status = 204, description = "Queue cleared"))
)]
pub async fn clear_queue(State(ctx): State<AppContext>) -> StatusCode {
    ctx.scheduler.clear_queue();
    StatusCode::NO_CONTENT
}

/// DELETE /api/scheduler/history
#[utoipa::path(
    delete,
    path = "/api/scheduler/history",
    responses((status = 204, description = "History cleared"))
)]
pub async fn clear_history(State(ctx): State<AppContext>) -> StatusCode {
    ctx.scheduler.clear_history();
    StatusCode::NO_CONTENT
}
