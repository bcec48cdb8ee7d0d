// In-memory repositories for tests. They count reads and writes and can
// inject transient failures.

use crate::{
    errors::{AppError, AppResult},
    models::{
        PayConfig, PeriodKey, Project, SettlementRecord, Worker, WorkItem, WorkerFilter,
    },
    repository::{SettlementStore, SourceRepository},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

#[derive(Default)]
pub struct MemorySource {
    pub workers: Mutex<Vec<Worker>>,
    pub work_items: Mutex<Vec<WorkItem>>,
    pub projects: Mutex<Vec<Project>>,
    pub config: Mutex<PayConfig>,
    work_item_fetches: AtomicUsize,
    failing_loads: AtomicU32,
}

impl MemorySource {
    pub fn new(workers: Vec<Worker>, work_items: Vec<WorkItem>, projects: Vec<Project>, config: PayConfig) -> Self {
        Self {
            workers: Mutex::new(workers),
            work_items: Mutex::new(work_items),
            projects: Mutex::new(projects),
            config: Mutex::new(config),
            work_item_fetches: AtomicUsize::new(0),
            failing_loads: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` work item loads fail as if the database were unreachable.
    pub fn fail_next_loads(&self, n: u32) {
        self.failing_loads.store(n, Ordering::SeqCst);
    }

    /// How many times earnings inputs were loaded.
    pub fn work_item_fetches(&self) -> usize {
        self.work_item_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceRepository for MemorySource {
    async fn list_workers(&self, filter: &WorkerFilter) -> AppResult<Vec<Worker>> {
        let mut workers: Vec<Worker> = self
            .workers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(workers)
    }

    async fn get_worker(&self, worker_id: Uuid) -> AppResult<Option<Worker>> {
        Ok(self
            .workers
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == worker_id)
            .cloned())
    }

    async fn list_work_items(&self, period: PeriodKey) -> AppResult<Vec<WorkItem>> {
        self.work_item_fetches.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(AppError::Unavailable("injected source failure".to_string()));
        }
        Ok(self
            .work_items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.completed_in(&period))
            .cloned()
            .collect())
    }

    async fn list_projects(&self) -> AppResult<Vec<Project>> {
        Ok(self.projects.lock().unwrap().clone())
    }

    async fn load_pay_config(&self) -> AppResult<PayConfig> {
        Ok(self.config.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(Uuid, PeriodKey), SettlementRecord>>,
    updates: Mutex<Vec<SettlementRecord>>,
    fail_next: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes fail as if the store were unreachable.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Every successful `update`, in order.
    pub fn updates(&self) -> Vec<SettlementRecord> {
        self.updates.lock().unwrap().clone()
    }

    pub fn get(&self, worker_id: Uuid, period: PeriodKey) -> Option<SettlementRecord> {
        self.records.lock().unwrap().get(&(worker_id, period)).cloned()
    }

    pub fn put(&self, record: SettlementRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((record.worker_id, record.period), record);
    }

    fn check_failure(&self) -> AppResult<()> {
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(AppError::Unavailable("injected store failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn find(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<Option<SettlementRecord>> {
        Ok(self.get(worker_id, period))
    }

    async fn list_for_period(&self, period: PeriodKey) -> AppResult<Vec<SettlementRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.period == period)
            .cloned()
            .collect())
    }

    async fn insert_if_absent(&self, record: &SettlementRecord) -> AppResult<SettlementRecord> {
        self.check_failure()?;
        let mut records = self.records.lock().unwrap();
        Ok(records
            .entry((record.worker_id, record.period))
            .or_insert_with(|| record.clone())
            .clone())
    }

    async fn update(&self, next: &SettlementRecord, current: &SettlementRecord) -> AppResult<bool> {
        self.check_failure()?;
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&(next.worker_id, next.period)) {
            Some(stored)
                if stored.id == next.id
                    && stored.status == current.status
                    && stored.updated_at == current.updated_at =>
            {
                *stored = next.clone();
                self.updates.lock().unwrap().push(next.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
