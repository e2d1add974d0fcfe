//! Runtime configuration handlers.
//!
//! Quality thresholds can be updated while the server runs; new scans pick
//! up the updated values on their next classification pass.

use axum::extract::State;
use axum::Json;

use cur_core::config::QualityThresholds;

use crate::context::AppContext;
use crate::error::AppError;

/// GET /api/config/quality
#[utoipa::path(
    get,
    path = "/api/config/quality",
    responses(
        (status = 200, description = "Active quality thresholds", body = QualityThresholds)
    )
)]
pub async fn get_quality_thresholds(State(ctx): State<AppContext>) -> Json<QualityThresholds> {
    Json(ctx.config_store.quality_thresholds())
}

/// PUT /api/config/quality
#[utoipa::path(
    put,
    path = "/api/config/quality",
    request_body = QualityThresholds,
    responses(
        (status = 200, description = "Thresholds updated", body = QualityThresholds),
        (status = 400, description = "Inverted cutoffs")
    )
)]
pub async fn set_quality_thresholds(
    State(ctx): State<AppContext>,
    Json(thresholds): Json<QualityThresholds>,
) -> Result<Json<QualityThresholds>, AppError> {
    validate_thresholds(&thresholds)?;
    ctx.config_store.set_quality_thresholds(thresholds);
    ctx.config_store.persist();
    Ok(Json(ctx.config_store.quality_thresholds()))
}

fn validate_thresholds(t: &QualityThresholds) -> Result<(), cur_core::Error> {
    for (name, cutoffs) in [
        ("sd", &t.sd),
        ("hd720", &t.hd720),
        ("hd1080", &t.hd1080),
        ("uhd4k", &t.uhd4k),
    ] {
        if cutoffs.medium_kbps >= cutoffs.high_kbps {
            return Err(cur_core::Error::Validation(format!(
                "{name}: medium_kbps must be below high_kbps"
            )));
        }
    }
    Ok(())
}
