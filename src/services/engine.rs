// src/services/engine.rs
//
// Owns the board selection (period + worker filter), the earnings cache for
// that selection, and the pass that reconciles computed earnings with the
// stored settlement records.

use crate::{
    config::SettlementSettings,
    errors::{AppError, AppResult, LifecycleError},
    models::{
        DrillDown, EarningsStats, FreezeRequest, ManualField, ManualFields, PassState, PayConfig, PeriodKey,
        Project, SettlementBoard, SettlementRecord, SettlementRow, SettlementStatus,
        SettlementView, WorkItem, Worker, WorkerFilter,
    },
    repository::{SettlementStore, SourceRepository},
    services::{
        cache::{CachedStats, PeriodCache},
        committer::{CommitKey, CommitWindow, EditCommitter},
        drilldown::DrillDownAggregator,
        lifecycle::{self, Transition},
        reconciler::{Merge, Reconciler},
        stats::StatsCalculator,
    },
};
use rust_decimal::Decimal;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a recomputation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed { workers: usize, failures: usize },
    /// A newer selection or recompute started; nothing from this pass was kept.
    Superseded,
}

struct Inputs {
    work_items: Vec<WorkItem>,
    projects: Vec<Project>,
    config: PayConfig,
}

pub struct SettlementEngine {
    sources: Arc<dyn SourceRepository>,
    store: Arc<dyn SettlementStore>,
    committer: EditCommitter,
    cache: Mutex<PeriodCache>,
    generation: AtomicU64,
    state: watch::Sender<PassState>,
}

impl SettlementEngine {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        store: Arc<dyn SettlementStore>,
        settings: SettlementSettings,
    ) -> Self {
        let (state, _) = watch::channel(PassState::Idle);
        Self {
            committer: EditCommitter::new(store.clone(), settings),
            sources,
            store,
            cache: Mutex::new(PeriodCache::new()),
            generation: AtomicU64::new(0),
            state,
        }
    }

    fn cache(&self) -> MutexGuard<'_, PeriodCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn status(&self) -> PassState {
        self.state.borrow().clone()
    }

    fn selection(&self) -> AppResult<(PeriodKey, WorkerFilter)> {
        self.cache()
            .scope()
            .cloned()
            .ok_or_else(|| AppError::BadRequest("No settlement period selected".to_string()))
    }

    // ─── Board ───────────────────────────────────────────────────────────

    /// Points the board at a period and filter. A new selection drops every
    /// cached computation and runs a full pass; the same selection only
    /// re-merges stored records with what is already cached, unless no
    /// pass has filled the cache yet.
    pub async fn select(&self, period: PeriodKey, filter: WorkerFilter) -> AppResult<SettlementBoard> {
        let needs_pass = {
            let mut cache = self.cache();
            let changed = cache.ensure_scope(period, &filter);
            changed || !cache.is_populated()
        };
        if needs_pass {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!(
                "Selected {} (role: {}), starting pass {}",
                period,
                filter.role.as_deref().unwrap_or("all"),
                generation
            );
            // The board still shows stored settlements, with the failure in its state.
            if let Err(e) = self.run_pass(generation, period, filter).await {
                warn!("Showing stored settlements for {} only: {}", period, e);
            }
        }
        self.board().await
    }

    /// Recomputes every worker in the current selection from fresh inputs.
    pub async fn recompute(&self) -> AppResult<PassOutcome> {
        let (period, filter) = self.selection()?;
        let generation = {
            let mut cache = self.cache();
            cache.invalidate();
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.run_pass(generation, period, filter).await
    }

    async fn run_pass(
        &self,
        generation: u64,
        period: PeriodKey,
        filter: WorkerFilter,
    ) -> AppResult<PassOutcome> {
        self.state.send_replace(PassState::Computing { generation });

        let loaded = async {
            let workers = self.sources.list_workers(&filter).await?;
            let inputs = self.load_inputs(period).await?;
            Ok::<_, AppError>((workers, inputs))
        }
        .await;
        let (workers, inputs) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Pass {} for {} could not load its inputs: {}", generation, period, e);
                if self.is_current(generation) {
                    self.state.send_replace(PassState::Failed {
                        generation,
                        reason: e.to_string(),
                    });
                }
                return Err(e);
            }
        };
        if !self.is_current(generation) {
            return Ok(self.superseded(generation));
        }

        let computed: Vec<(Worker, CachedStats)> = workers
            .into_iter()
            .map(|worker| {
                let stats = compute_isolated(&worker, &inputs, period);
                (worker, stats)
            })
            .collect();

        {
            let mut cache = self.cache();
            if !self.is_current(generation) {
                return Ok(self.superseded(generation));
            }
            for (worker, stats) in &computed {
                cache.insert(worker.id, period, stats.clone());
            }
            cache.mark_populated();
            debug!("{} computations cached for {}", cache.entry_count(), period);
        }

        let mut failures = 0;
        for (worker, stats) in &computed {
            if !self.is_current(generation) {
                return Ok(self.superseded(generation));
            }
            if matches!(stats, CachedStats::Failed(_)) {
                failures += 1;
            }
            // One worker's store failure must not stop the rest of the pass.
            if let Err(e) = self.persist_merge(worker, period, stats).await {
                error!(
                    "Could not save settlement for worker {} in {}: {}",
                    worker.id, period, e
                );
            }
        }

        if !self.is_current(generation) {
            return Ok(self.superseded(generation));
        }
        let workers = computed.len();
        self.state.send_replace(PassState::Ready {
            generation,
            workers,
            failures,
        });
        info!(
            "Pass {} for {} finished: {} workers, {} failed",
            generation, period, workers, failures
        );
        Ok(PassOutcome::Completed { workers, failures })
    }

    fn superseded(&self, generation: u64) -> PassOutcome {
        debug!("Pass {} superseded; discarding its results", generation);
        PassOutcome::Superseded
    }

    async fn load_inputs(&self, period: PeriodKey) -> AppResult<Inputs> {
        Ok(Inputs {
            work_items: self.sources.list_work_items(period).await?,
            projects: self.sources.list_projects().await?,
            config: self.sources.load_pay_config().await?,
        })
    }

    async fn persist_merge(
        &self,
        worker: &Worker,
        period: PeriodKey,
        stats: &CachedStats,
    ) -> AppResult<SettlementRecord> {
        for _ in 0..2 {
            let existing = self.store.find(worker.id, period).await?;
            match Reconciler::merge(existing.as_ref(), worker, period, stats, lifecycle::now()) {
                Merge::Created(record) => return self.store.insert_if_absent(&record).await,
                Merge::Updated(record) => {
                    let Some(current) = existing.as_ref() else {
                        return Ok(record);
                    };
                    if self.store.update(&record, current).await? {
                        debug!("Draft for worker {} in {} updated", worker.id, period);
                        return Ok(record);
                    }
                }
                merge @ (Merge::Unchanged(_) | Merge::Placeholder(_)) => {
                    return Ok(merge.into_record());
                }
            }
        }
        Err(AppError::Conflict(format!(
            "Settlement for worker {} in {} changed during recompute",
            worker.id, period
        )))
    }

    /// Rows for the current selection. Reuses cached computations; only the
    /// merge with stored records and pending edits is redone.
    pub async fn board(&self) -> AppResult<SettlementBoard> {
        let (period, filter) = self.selection()?;
        let workers = self.sources.list_workers(&filter).await?;
        let mut records: HashMap<Uuid, SettlementRecord> = self
            .store
            .list_for_period(period)
            .await?
            .into_iter()
            .map(|record| (record.worker_id, record))
            .collect();

        let now = lifecycle::now();
        let rows: Vec<SettlementRow> = {
            let cache = self.cache();
            workers
                .into_iter()
                .filter_map(|worker| {
                    let existing = records.remove(&worker.id);
                    let (record, live, unavailable) = match cache.get(worker.id, period) {
                        Some(computed) => {
                            let merge =
                                Reconciler::merge(existing.as_ref(), &worker, period, computed, now);
                            let (live, unavailable) = match computed {
                                CachedStats::Ready(stats) => (Some(stats.clone()), None),
                                CachedStats::Failed(reason) => (None, Some(reason.clone())),
                            };
                            (merge.into_record(), live, unavailable)
                        }
                        // Not computed yet (the worker joined after the last pass).
                        None => (existing?, None, None),
                    };
                    Some(self.row(worker, record, live, unavailable))
                })
                .collect()
        };

        Ok(SettlementBoard {
            period,
            filter,
            state: self.status(),
            rows,
        })
    }

    fn row(
        &self,
        worker: Worker,
        record: SettlementRecord,
        live: Option<EarningsStats>,
        unavailable: Option<String>,
    ) -> SettlementRow {
        let key = CommitKey {
            worker_id: worker.id,
            period: record.period,
        };
        SettlementRow {
            worker_id: worker.id,
            worker_name: worker.name,
            job_title: worker.job_title,
            settlement: self.view(record),
            live,
            unavailable,
            unsaved: self.committer.is_unsaved(key),
            commit_error: self.committer.last_error(key),
        }
    }

    /// Unsaved edits take precedence over stored values while a record is a Draft.
    fn view(&self, record: SettlementRecord) -> SettlementView {
        let key = CommitKey {
            worker_id: record.worker_id,
            period: record.period,
        };
        match self.committer.overlay(key) {
            Some(fields) if record.status == SettlementStatus::Draft => {
                record.with_manual(fields).into()
            }
            _ => record.into(),
        }
    }

    // ─── Single worker ───────────────────────────────────────────────────

    async fn worker(&self, worker_id: Uuid) -> AppResult<Worker> {
        self.sources
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Worker {} not found", worker_id)))
    }

    /// Earnings straight from the sources, bypassing the cache.
    pub async fn compute_stats(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<EarningsStats> {
        let worker = self.worker(worker_id).await?;
        let inputs = self.load_inputs(period).await?;
        StatsCalculator::compute(
            &worker,
            &inputs.work_items,
            &inputs.projects,
            &inputs.config,
            period,
        )
        .map_err(|e| AppError::Internal(format!("Earnings for worker {}: {}", worker_id, e)))
    }

    /// The cached computation, or a fresh one for pairs the last pass did not cover.
    async fn computed(&self, worker: &Worker, period: PeriodKey) -> AppResult<CachedStats> {
        if let Some(cached) = self.cache().get(worker.id, period).cloned() {
            return Ok(cached);
        }
        let inputs = self.load_inputs(period).await?;
        let stats = compute_isolated(worker, &inputs, period);

        let mut cache = self.cache();
        if cache.scope().is_some_and(|(p, _)| *p == period) {
            cache.insert(worker.id, period, stats.clone());
        }
        Ok(stats)
    }

    pub async fn get_or_create_record(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<SettlementView> {
        let (record, _) = self.load_or_create(worker_id, period).await?;
        Ok(self.view(record))
    }

    /// The stored record, creating the Draft if needed. The flag is `false`
    /// for the unsaved placeholder of a worker whose earnings failed.
    async fn load_or_create(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<(SettlementRecord, bool)> {
        if let Some(record) = self.store.find(worker_id, period).await? {
            return Ok((record, true));
        }
        let worker = self.worker(worker_id).await?;
        let computed = self.computed(&worker, period).await?;
        match Reconciler::merge(None, &worker, period, &computed, lifecycle::now()) {
            Merge::Created(record) => {
                info!("Created draft settlement for worker {} in {}", worker_id, period);
                Ok((self.store.insert_if_absent(&record).await?, true))
            }
            merge => Ok((merge.into_record(), false)),
        }
    }

    /// A persisted record, or `Unavailable` naming why the Draft could not be created.
    async fn persisted_record(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<SettlementRecord> {
        let (record, persisted) = self.load_or_create(worker_id, period).await?;
        if persisted {
            return Ok(record);
        }
        let reason = match self.cache().get(worker_id, period) {
            Some(CachedStats::Failed(reason)) => reason.clone(),
            _ => "earnings could not be computed".to_string(),
        };
        Err(AppError::Unavailable(format!(
            "Settlement for worker {} in {} has no saved draft: {}",
            worker_id, period, reason
        )))
    }

    /// Stages manual-field edits. They show up at once and are persisted
    /// after the commit window; a single field and several fields use
    /// separate windows.
    pub async fn update_manual_fields(
        &self,
        worker_id: Uuid,
        period: PeriodKey,
        fields: ManualFields,
    ) -> AppResult<SettlementView> {
        if fields.is_empty() {
            return Err(AppError::Validation("No manual field given".to_string()));
        }
        validate_non_negative(&[fields.manual_bonus, fields.manual_penalty, fields.advance])?;

        let record = self.persisted_record(worker_id, period).await?;
        if record.status != SettlementStatus::Draft {
            return Err(AppError::lifecycle(
                worker_id,
                period,
                LifecycleError::Locked {
                    status: record.status,
                },
            ));
        }

        let window = if fields.len() > 1 {
            CommitWindow::Batch
        } else {
            CommitWindow::Field
        };
        self.committer
            .stage(CommitKey { worker_id, period }, fields, window);

        Ok(self.view(record))
    }

    pub async fn update_manual_field(
        &self,
        worker_id: Uuid,
        period: PeriodKey,
        field: ManualField,
        value: Decimal,
    ) -> AppResult<SettlementView> {
        self.update_manual_fields(worker_id, period, ManualFields::single(field, value))
            .await
    }

    /// Writes a worker's pending edits without waiting for the window.
    pub async fn flush_edits(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<SettlementView> {
        let key = CommitKey { worker_id, period };
        self.committer.flush_now(key).await;
        if let Some(e) = self.committer.last_error(key) {
            return Err(AppError::Unavailable(e));
        }
        self.get_or_create_record(worker_id, period).await
    }

    /// Freezes a Draft with the given manual values. Pending edits for the
    /// record are dropped; the values passed here are the final ones.
    pub async fn freeze(
        &self,
        worker_id: Uuid,
        period: PeriodKey,
        values: FreezeRequest,
        by: &str,
    ) -> AppResult<SettlementView> {
        validate_non_negative(&[
            Some(values.manual_bonus),
            Some(values.manual_penalty),
            Some(values.advance),
        ])?;
        self.persisted_record(worker_id, period).await?;

        let record = lifecycle::apply(
            self.store.as_ref(),
            worker_id,
            period,
            Transition::Freeze {
                values,
                by: by.to_string(),
            },
        )
        .await?;
        self.committer.discard(CommitKey { worker_id, period }).await;

        info!(
            "Settlement for worker {} in {} frozen by {} (total {})",
            worker_id,
            period,
            by,
            record.total()
        );
        Ok(record.into())
    }

    pub async fn pay(&self, worker_id: Uuid, period: PeriodKey, by: &str) -> AppResult<SettlementView> {
        let record = lifecycle::apply(
            self.store.as_ref(),
            worker_id,
            period,
            Transition::Pay { by: by.to_string() },
        )
        .await?;

        info!(
            "Settlement for worker {} in {} paid by {} (total {})",
            worker_id,
            period,
            by,
            record.total()
        );
        Ok(record.into())
    }

    pub async fn drill_down(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<DrillDown> {
        let worker = self.worker(worker_id).await?;
        let computed = self.computed(&worker, period).await?;
        Ok(DrillDownAggregator::assemble(worker_id, period, &computed))
    }
}

/// One worker's computation, with failures captured instead of propagated.
fn compute_isolated(worker: &Worker, inputs: &Inputs, period: PeriodKey) -> CachedStats {
    match StatsCalculator::compute(
        worker,
        &inputs.work_items,
        &inputs.projects,
        &inputs.config,
        period,
    ) {
        Ok(stats) => {
            for issue in &stats.issues {
                warn!("Worker {} ({}) in {}: {}", worker.name, worker.id, period, issue);
            }
            CachedStats::Ready(stats)
        }
        Err(e) => {
            error!(
                "Earnings for worker {} ({}) in {} unavailable: {}",
                worker.name, worker.id, period, e
            );
            CachedStats::Failed(e.to_string())
        }
    }
}

fn validate_non_negative(values: &[Option<Decimal>]) -> AppResult<()> {
    if values.iter().flatten().any(|v| *v < Decimal::ZERO) {
        return Err(AppError::Validation(
            "Manual amounts cannot be negative".to_string(),
        ));
    }
    Ok(())
}
