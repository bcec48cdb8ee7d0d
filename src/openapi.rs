// src/openapi.rs

use crate::models::{
    BonusCalculationDetail, BonusMetric, Comparator, ContentDetail, DrillDown, EarningsStats,
    FreezeRequest, ManualEditRequest, ManualField, ManualFieldValue, PassState, PeriodKey,
    SettlementBoard, SettlementRecord, SettlementRow, SettlementStatus, SettlementView,
    TaskDetail, WorkerFilter,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Settlement Engine API",
        version = "1.0.0",
        description = "Period settlements for workers, built with Rust and Axum. \
            Computes earnings from completed work, shared content and bonus rules, \
            reconciles them with stored settlements, and moves each settlement \
            through Draft, Frozen and Paid.",
        license(name = "MIT")
    ),
    paths(
        // Board
        crate::handlers::settlement::get_board,
        crate::handlers::settlement::get_pass_status,
        crate::handlers::settlement::recompute,
        // Single settlement
        crate::handlers::settlement::get_settlement,
        crate::handlers::settlement::edit_manual_fields,
        crate::handlers::settlement::edit_manual_field,
        crate::handlers::settlement::flush_manual_fields,
        crate::handlers::settlement::freeze_settlement,
        crate::handlers::settlement::pay_settlement,
        crate::handlers::settlement::get_breakdown,
        // Earnings
        crate::handlers::stats::get_worker_stats,
    ),
    components(
        schemas(
            PeriodKey, WorkerFilter, PassState,
            SettlementBoard, SettlementRow, SettlementView, SettlementRecord, SettlementStatus,
            ManualEditRequest, ManualField, ManualFieldValue, FreezeRequest,
            EarningsStats, TaskDetail, ContentDetail, BonusCalculationDetail,
            BonusMetric, Comparator, DrillDown,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Settlements", description = "Board, manual adjustments, freeze and pay"),
        (name = "Earnings", description = "Computed earnings for one worker and period"),
    )
)]
pub struct ApiDoc;
