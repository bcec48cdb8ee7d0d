// src/services/reconciler.rs

use crate::{
    models::{EarningsStats, PeriodKey, SettlementRecord, SettlementStatus, Worker},
    services::{
        cache::CachedStats,
        lifecycle::{Transition, new_draft, transition},
    },
};
use chrono::{DateTime, Utc};

/// What a merge decided for one worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Merge {
    /// No record existed; this Draft should be inserted.
    Created(SettlementRecord),
    /// A Draft picked up new computed values and should be saved.
    Updated(SettlementRecord),
    /// Nothing to write: the values match, or the record is locked.
    Unchanged(SettlementRecord),
    /// The computation failed and no record exists; a zeroed stand-in
    /// for display only, never persisted.
    Placeholder(SettlementRecord),
}

impl Merge {
    pub fn into_record(self) -> SettlementRecord {
        match self {
            Merge::Created(r) | Merge::Updated(r) | Merge::Unchanged(r) | Merge::Placeholder(r) => r,
        }
    }
}

pub struct Reconciler;

impl Reconciler {
    /// The single place computed earnings meet stored records. Drafts take
    /// the computed values and keep their manual fields; Frozen and Paid
    /// records are returned as stored.
    pub fn merge(
        existing: Option<&SettlementRecord>,
        worker: &Worker,
        period: PeriodKey,
        computed: &CachedStats,
        at: DateTime<Utc>,
    ) -> Merge {
        match (existing, computed) {
            (None, CachedStats::Ready(stats)) => Merge::Created(new_draft(worker, period, stats, at)),
            (None, CachedStats::Failed(_)) => Merge::Placeholder(new_draft(
                worker,
                period,
                &EarningsStats::zeroed(worker.id, period),
                at,
            )),
            (Some(record), CachedStats::Failed(_)) => Merge::Unchanged(record.clone()),
            (Some(record), CachedStats::Ready(stats)) => {
                if record.status != SettlementStatus::Draft {
                    return Merge::Unchanged(record.clone());
                }
                let unchanged = record.fixed_salary == stats.base_salary
                    && record.calculated_kpi == stats.calculated_kpi()
                    && record.task_payments == stats.details;
                if unchanged {
                    return Merge::Unchanged(record.clone());
                }
                match transition(record, Transition::recompute(stats), at) {
                    Ok(updated) => Merge::Updated(updated),
                    Err(_) => Merge::Unchanged(record.clone()),
                }
            }
        }
    }
}
