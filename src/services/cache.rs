// src/services/cache.rs

use crate::models::{EarningsStats, PeriodKey, WorkerFilter};
use std::collections::HashMap;
use uuid::Uuid;

/// A cached computation. Failures are cached too, so a broken worker is
/// not recomputed on every refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedStats {
    Ready(EarningsStats),
    Failed(String),
}

/// Memoised earnings keyed by `(worker, period)`, owned by whoever holds
/// the period/filter selection. The whole cache belongs to one scope;
/// moving to another scope drops every entry.
#[derive(Debug, Default)]
pub struct PeriodCache {
    scope: Option<(PeriodKey, WorkerFilter)>,
    entries: HashMap<(Uuid, PeriodKey), CachedStats>,
    /// A pass has filled the cache for the current scope.
    populated: bool,
}

impl PeriodCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the cache at a selection, returning `true` when that
    /// invalidated it.
    pub fn ensure_scope(&mut self, period: PeriodKey, filter: &WorkerFilter) -> bool {
        let unchanged = self
            .scope
            .as_ref()
            .is_some_and(|(p, f)| *p == period && f == filter);
        if unchanged {
            return false;
        }
        self.entries.clear();
        self.populated = false;
        self.scope = Some((period, filter.clone()));
        true
    }

    pub fn scope(&self) -> Option<&(PeriodKey, WorkerFilter)> {
        self.scope.as_ref()
    }

    pub fn get(&self, worker_id: Uuid, period: PeriodKey) -> Option<&CachedStats> {
        self.entries.get(&(worker_id, period))
    }

    pub fn insert(&mut self, worker_id: Uuid, period: PeriodKey, stats: CachedStats) {
        self.entries.insert((worker_id, period), stats);
    }

    /// Drops every entry but keeps the scope, forcing the next pass to recompute.
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.populated = false;
    }

    pub fn mark_populated(&mut self) {
        self.populated = true;
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}
