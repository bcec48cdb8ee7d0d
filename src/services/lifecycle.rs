// src/services/lifecycle.rs
//
// Draft ──freeze──▶ Frozen ──pay──▶ Paid
//
// Every mutation of a settlement record goes through `transition`, which
// checks the current status first and returns a new record; on error the
// input is untouched. `apply` is the only way a transition reaches the store.

use crate::{
    errors::{AppError, AppResult, LifecycleError},
    models::{
        EarningsStats, FreezeRequest, ManualFields, PeriodKey, SettlementRecord,
        SettlementStatus, TaskDetail, Worker,
    },
    repository::SettlementStore,
};
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Transition {
    /// Replace computed amounts with a fresh computation.
    Recompute {
        fixed_salary: Decimal,
        calculated_kpi: Decimal,
        task_payments: Vec<TaskDetail>,
    },
    EditManual(ManualFields),
    Freeze {
        values: FreezeRequest,
        by: String,
    },
    Pay {
        by: String,
    },
}

impl Transition {
    pub fn recompute(stats: &EarningsStats) -> Self {
        Transition::Recompute {
            fixed_salary: stats.base_salary,
            calculated_kpi: stats.calculated_kpi(),
            task_payments: stats.details.clone(),
        }
    }
}

/// A fresh Draft for a worker's first appearance in a period.
pub fn new_draft(
    worker: &Worker,
    period: PeriodKey,
    stats: &EarningsStats,
    at: DateTime<Utc>,
) -> SettlementRecord {
    SettlementRecord {
        id: Uuid::new_v4(),
        worker_id: worker.id,
        period,
        fixed_salary: stats.base_salary,
        calculated_kpi: stats.calculated_kpi(),
        manual_bonus: Decimal::ZERO,
        manual_penalty: Decimal::ZERO,
        advance: Decimal::ZERO,
        task_payments: stats.details.clone(),
        starting_balance: worker.balance,
        status: SettlementStatus::Draft,
        frozen_at: None,
        frozen_by: None,
        paid_at: None,
        paid_by: None,
        created_at: at,
        updated_at: at,
    }
}

pub fn transition(
    record: &SettlementRecord,
    action: Transition,
    at: DateTime<Utc>,
) -> Result<SettlementRecord, LifecycleError> {
    use SettlementStatus::*;

    let mut next = record.clone();
    match (record.status, action) {
        (
            Draft,
            Transition::Recompute {
                fixed_salary,
                calculated_kpi,
                task_payments,
            },
        ) => {
            next.fixed_salary = fixed_salary;
            next.calculated_kpi = calculated_kpi;
            next.task_payments = task_payments;
        }
        (Draft, Transition::EditManual(fields)) => {
            next = next.with_manual(fields);
        }
        (Draft, Transition::Freeze { values, by }) => {
            next.manual_bonus = values.manual_bonus;
            next.manual_penalty = values.manual_penalty;
            next.advance = values.advance;
            next.status = Frozen;
            next.frozen_at = Some(at);
            next.frozen_by = Some(by);
        }
        (Frozen, Transition::Pay { by }) => {
            next.status = Paid;
            next.paid_at = Some(at);
            next.paid_by = Some(by);
        }
        (Draft, Transition::Pay { .. }) => return Err(LifecycleError::NotFrozen { status: Draft }),
        (Frozen, Transition::Freeze { .. }) => return Err(LifecycleError::AlreadyFrozen),
        (Paid, Transition::Freeze { .. } | Transition::Pay { .. }) => {
            return Err(LifecycleError::AlreadyPaid);
        }
        (status @ (Frozen | Paid), Transition::Recompute { .. } | Transition::EditManual(_)) => {
            return Err(LifecycleError::Locked { status });
        }
    }
    next.updated_at = at;
    Ok(next)
}

/// Current time at the precision Postgres keeps, so a record read back
/// compares equal to the one that was written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Loads the stored record, applies `action` and saves it, guarded on the
/// version that was read. A lost race is retried once on a fresh read.
pub async fn apply(
    store: &dyn SettlementStore,
    worker_id: Uuid,
    period: PeriodKey,
    action: Transition,
) -> AppResult<SettlementRecord> {
    for _ in 0..2 {
        let current = store.find(worker_id, period).await?.ok_or_else(|| {
            AppError::NotFound(format!("Settlement for worker {} in {}", worker_id, period))
        })?;
        let next = transition(&current, action.clone(), now())
            .map_err(|e| AppError::lifecycle(worker_id, period, e))?;
        if store.update(&next, &current).await? {
            return Ok(next);
        }
    }
    Err(AppError::Conflict(format!(
        "Settlement for worker {} in {} changed concurrently",
        worker_id, period
    )))
}
