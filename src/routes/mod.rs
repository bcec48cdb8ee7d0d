// src/routes/mod.rs

use crate::{
    handlers::{
        settlement::{
            edit_manual_field, edit_manual_fields, flush_manual_fields, freeze_settlement, get_board, get_breakdown,
            get_pass_status, get_settlement, pay_settlement, recompute,
        },
        stats::get_worker_stats,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // ─── Board ────────────────────────────────────────────
        .route("/settlements", get(get_board))
        .route("/settlements/status", get(get_pass_status))
        .route("/settlements/recompute", post(recompute))
        // ─── Single settlement ────────────────────────────────
        .route("/settlements/{period}/{worker_id}", get(get_settlement))
        .route(
            "/settlements/{period}/{worker_id}/manual",
            patch(edit_manual_fields),
        )
        .route(
            "/settlements/{period}/{worker_id}/manual/{field}",
            put(edit_manual_field),
        )
        .route(
            "/settlements/{period}/{worker_id}/flush",
            post(flush_manual_fields),
        )
        .route(
            "/settlements/{period}/{worker_id}/freeze",
            post(freeze_settlement),
        )
        .route("/settlements/{period}/{worker_id}/pay", post(pay_settlement))
        .route(
            "/settlements/{period}/{worker_id}/breakdown",
            get(get_breakdown),
        )
        // ─── Earnings ─────────────────────────────────────────
        .route("/stats/{period}/{worker_id}", get(get_worker_stats))
}
