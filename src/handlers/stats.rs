// src/handlers/stats.rs

use crate::{
    auth::AuthOperator,
    errors::AppResult,
    models::{EarningsStats, PeriodKey},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Compute a worker's earnings for a period from current data.
/// Nothing is cached or stored.
#[utoipa::path(
    get,
    path = "/api/v1/stats/{period}/{worker_id}",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    responses(
        (status = 200, description = "Earnings", body = EarningsStats),
        (status = 400, description = "Malformed period"),
        (status = 404, description = "Worker not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Earnings"
)]
pub async fn get_worker_stats(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
) -> AppResult<Json<EarningsStats>> {
    let period: PeriodKey = period.parse()?;
    let stats = state.engine.compute_stats(worker_id, period).await?;
    Ok(Json(stats))
}
