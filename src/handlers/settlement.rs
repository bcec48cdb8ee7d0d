// src/handlers/settlement.rs

use crate::{
    auth::AuthOperator,
    errors::AppResult,
    models::{
        BoardQuery, DrillDown, FreezeRequest, ManualEditRequest, ManualField, ManualFieldValue,
        PassState, PeriodKey, SettlementBoard, SettlementView, WorkerFilter,
    },
    services::engine::PassOutcome,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

fn parse_period(raw: &str) -> AppResult<PeriodKey> {
    Ok(raw.parse()?)
}

/// Select a period (and optional role) and get the settlement board.
/// Selecting a new period or role recomputes every worker; repeating the
/// current selection reuses cached earnings.
#[utoipa::path(
    get,
    path = "/api/v1/settlements",
    params(BoardQuery),
    responses(
        (status = 200, description = "Settlement board", body = SettlementBoard),
        (status = 400, description = "Malformed period"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn get_board(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> AppResult<Json<SettlementBoard>> {
    let period = parse_period(&query.period)?;
    let filter = query
        .role
        .filter(|r| !r.trim().is_empty())
        .map(WorkerFilter::role)
        .unwrap_or_default();
    let board = state.engine.select(period, filter).await?;
    Ok(Json(board))
}

/// Progress of the most recent recomputation pass
#[utoipa::path(
    get,
    path = "/api/v1/settlements/status",
    responses(
        (status = 200, description = "Pass state", body = PassState),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn get_pass_status(
    _operator: AuthOperator,
    State(state): State<AppState>,
) -> Json<PassState> {
    Json(state.engine.status())
}

/// Drop cached earnings for the current selection and recompute everyone.
#[utoipa::path(
    post,
    path = "/api/v1/settlements/recompute",
    responses(
        (status = 200, description = "Board after recomputation", body = SettlementBoard),
        (status = 400, description = "No period selected yet"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn recompute(
    operator: AuthOperator,
    State(state): State<AppState>,
) -> AppResult<Json<SettlementBoard>> {
    info!("Recompute requested by {}", operator.name);
    match state.engine.recompute().await? {
        PassOutcome::Completed { workers, failures } => {
            info!("Recompute by {}: {} workers, {} failed", operator.name, workers, failures)
        }
        PassOutcome::Superseded => {
            info!("Recompute by {} was superseded by a newer pass", operator.name)
        }
    }
    let board = state.engine.board().await?;
    Ok(Json(board))
}

/// Get a worker's settlement for a period, creating the Draft if needed
#[utoipa::path(
    get,
    path = "/api/v1/settlements/{period}/{worker_id}",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    responses(
        (status = 200, description = "Settlement", body = SettlementView),
        (status = 404, description = "Worker not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn get_settlement(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
) -> AppResult<Json<SettlementView>> {
    let period = parse_period(&period)?;
    let view = state.engine.get_or_create_record(worker_id, period).await?;
    Ok(Json(view))
}

/// Edit manual bonus, penalty or advance on a Draft.
/// Returns 202: the edit is visible at once and persisted after a short quiet interval.
#[utoipa::path(
    patch,
    path = "/api/v1/settlements/{period}/{worker_id}/manual",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    request_body = ManualEditRequest,
    responses(
        (status = 202, description = "Edit staged", body = SettlementView),
        (status = 400, description = "Empty or negative values"),
        (status = 422, description = "Settlement is frozen or paid"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn edit_manual_fields(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
    Json(body): Json<ManualEditRequest>,
) -> AppResult<(StatusCode, Json<SettlementView>)> {
    let period = parse_period(&period)?;
    let view = state
        .engine
        .update_manual_fields(worker_id, period, body.into())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// Edit a single manual field on a Draft
#[utoipa::path(
    put,
    path = "/api/v1/settlements/{period}/{worker_id}/manual/{field}",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
        ("field" = ManualField, Path, description = "manual_bonus, manual_penalty or advance"),
    ),
    request_body = ManualFieldValue,
    responses(
        (status = 202, description = "Edit staged", body = SettlementView),
        (status = 400, description = "Negative value"),
        (status = 422, description = "Settlement is frozen or paid"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn edit_manual_field(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id, field)): Path<(String, Uuid, ManualField)>,
    Json(body): Json<ManualFieldValue>,
) -> AppResult<(StatusCode, Json<SettlementView>)> {
    let period = parse_period(&period)?;
    let view = state
        .engine
        .update_manual_field(worker_id, period, field, body.value)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// Persist staged manual edits now
#[utoipa::path(
    post,
    path = "/api/v1/settlements/{period}/{worker_id}/flush",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    responses(
        (status = 200, description = "Edits persisted", body = SettlementView),
        (status = 503, description = "Store unreachable; edits stay staged"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn flush_manual_fields(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
) -> AppResult<Json<SettlementView>> {
    let period = parse_period(&period)?;
    let view = state.engine.flush_edits(worker_id, period).await?;
    Ok(Json(view))
}

/// Freeze a Draft with its final manual values
#[utoipa::path(
    post,
    path = "/api/v1/settlements/{period}/{worker_id}/freeze",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    request_body = FreezeRequest,
    responses(
        (status = 200, description = "Settlement frozen", body = SettlementView),
        (status = 422, description = "Settlement already frozen or paid"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn freeze_settlement(
    operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
    Json(body): Json<FreezeRequest>,
) -> AppResult<Json<SettlementView>> {
    let period = parse_period(&period)?;
    let view = state
        .engine
        .freeze(worker_id, period, body, &operator.name)
        .await?;
    Ok(Json(view))
}

/// Mark a Frozen settlement as paid
#[utoipa::path(
    post,
    path = "/api/v1/settlements/{period}/{worker_id}/pay",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    responses(
        (status = 200, description = "Settlement paid", body = SettlementView),
        (status = 404, description = "No settlement for this worker and period"),
        (status = 422, description = "Settlement is not frozen"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn pay_settlement(
    operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
) -> AppResult<Json<SettlementView>> {
    let period = parse_period(&period)?;
    let view = state.engine.pay(worker_id, period, &operator.name).await?;
    Ok(Json(view))
}

/// Itemised tasks, content and bonus checks behind a worker's KPI
#[utoipa::path(
    get,
    path = "/api/v1/settlements/{period}/{worker_id}/breakdown",
    params(
        ("period" = String, Path, description = "Period, YYYY-MM"),
        ("worker_id" = Uuid, Path, description = "Worker ID"),
    ),
    responses(
        (status = 200, description = "Breakdown", body = DrillDown),
        (status = 404, description = "Worker not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Settlements"
)]
pub async fn get_breakdown(
    _operator: AuthOperator,
    State(state): State<AppState>,
    Path((period, worker_id)): Path<(String, Uuid)>,
) -> AppResult<Json<DrillDown>> {
    let period = parse_period(&period)?;
    let drill = state.engine.drill_down(worker_id, period).await?;
    Ok(Json(drill))
}
