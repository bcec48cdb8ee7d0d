// src/repository/mod.rs

use crate::{
    errors::AppResult,
    models::{
        PayConfig, PeriodKey, Project, SettlementRecord, Worker, WorkItem, WorkerFilter,
    },
};
use async_trait::async_trait;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// Read-only data owned by other subsystems.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn list_workers(&self, filter: &WorkerFilter) -> AppResult<Vec<Worker>>;

    async fn get_worker(&self, worker_id: Uuid) -> AppResult<Option<Worker>>;

    /// Work items that may qualify for `period`; callers still filter.
    async fn list_work_items(&self, period: PeriodKey) -> AppResult<Vec<WorkItem>>;

    async fn list_projects(&self) -> AppResult<Vec<Project>>;

    async fn load_pay_config(&self) -> AppResult<PayConfig>;
}

/// Durable settlement records, one per `(worker, period)`.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn find(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<Option<SettlementRecord>>;

    async fn list_for_period(&self, period: PeriodKey) -> AppResult<Vec<SettlementRecord>>;

    /// Inserts unless the pair already has a record; returns the stored one.
    async fn insert_if_absent(&self, record: &SettlementRecord) -> AppResult<SettlementRecord>;

    /// Saves `next` only while the stored row still matches `current`
    /// (same status and `updated_at`). Returns `false` when it does not.
    async fn update(&self, next: &SettlementRecord, current: &SettlementRecord) -> AppResult<bool>;
}
