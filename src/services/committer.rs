// src/services/committer.rs

use crate::{
    config::SettlementSettings,
    errors::AppResult,
    models::{ManualFields, PeriodKey, SettlementRecord},
    repository::SettlementStore,
    services::lifecycle::{self, Transition},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitKey {
    pub worker_id: Uuid,
    pub period: PeriodKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitWindow {
    Field,
    Batch,
}

#[derive(Default)]
struct PendingEdit {
    /// Edits waiting for the quiet interval.
    queued: ManualFields,
    /// Edits handed to the store and not yet confirmed.
    in_flight: ManualFields,
    generation: u64,
    attempts: u32,
    last_error: Option<String>,
    /// The deferred flush. Only a sleeping task is ever stored here.
    task: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn SettlementStore>,
    settings: SettlementSettings,
    pending: Mutex<HashMap<CommitKey, PendingEdit>>,
    /// Serialises writes, discards and freezes per record.
    write_gates: Mutex<HashMap<CommitKey, Arc<tokio::sync::Mutex<()>>>>,
    generations: AtomicU64,
}

/// Debounced persistence of manual-field edits.
///
/// `stage` makes an edit visible through `overlay` at once and (re)arms a
/// timer for its key; each new edit cancels the previous timer. Only a
/// timer firing after a full quiet interval writes to the store, so a
/// burst of edits becomes one write carrying the latest values.
#[derive(Clone)]
pub struct EditCommitter {
    inner: Arc<Inner>,
}

impl EditCommitter {
    pub fn new(store: Arc<dyn SettlementStore>, settings: SettlementSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                settings,
                pending: Mutex::new(HashMap::new()),
                write_gates: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<CommitKey, PendingEdit>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_gate(&self, key: CommitKey) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .write_gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key)
            .or_default()
            .clone()
    }

    pub fn stage(&self, key: CommitKey, fields: ManualFields, window: CommitWindow) {
        if fields.is_empty() {
            return;
        }
        let delay = match window {
            CommitWindow::Field => self.inner.settings.field_commit_window,
            CommitWindow::Batch => self.inner.settings.batch_commit_window,
        };
        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;

        let mut pending = self.pending();
        let entry = pending.entry(key).or_default();
        entry.queued.merge(fields);
        entry.generation = generation;
        entry.attempts = 0;
        if let Some(task) = entry.task.take() {
            task.abort();
        }
        entry.task = Some(self.schedule(key, generation, delay));

        debug!(
            "Staged edit for worker {} in {} (commit in {:?})",
            key.worker_id, key.period, delay
        );
    }

    /// Unsaved values for a key; they take precedence over stored ones.
    pub fn overlay(&self, key: CommitKey) -> Option<ManualFields> {
        let pending = self.pending();
        pending.get(&key).map(|entry| {
            let mut fields = entry.in_flight;
            fields.merge(entry.queued);
            fields
        })
    }

    pub fn is_unsaved(&self, key: CommitKey) -> bool {
        self.pending().contains_key(&key)
    }

    pub fn last_error(&self, key: CommitKey) -> Option<String> {
        self.pending()
            .get(&key)
            .and_then(|entry| entry.last_error.clone())
    }

    /// Drops queued edits for a key, waiting out any write already running.
    pub async fn discard(&self, key: CommitKey) {
        let gate = self.write_gate(key);
        let _guard = gate.lock().await;
        if let Some(entry) = self.pending().remove(&key) {
            if let Some(task) = entry.task {
                task.abort();
            }
            debug!("Discarded pending edits for worker {} in {}", key.worker_id, key.period);
        }
    }

    /// Writes a key's pending edits now instead of waiting for its timer.
    pub async fn flush_now(&self, key: CommitKey) {
        let generation = {
            let mut pending = self.pending();
            let Some(entry) = pending.get_mut(&key) else {
                return;
            };
            if let Some(task) = entry.task.take() {
                task.abort();
            }
            entry.attempts = 0;
            entry.generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
            entry.generation
        };
        self.flush(key, generation).await;
    }

    fn schedule(&self, key: CommitKey, generation: u64, delay: Duration) -> JoinHandle<()> {
        let committer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            committer.flush(key, generation).await;
        })
    }

    async fn flush(&self, key: CommitKey, generation: u64) {
        let gate = self.write_gate(key);
        let _guard = gate.lock().await;

        let fields = {
            let mut pending = self.pending();
            let Some(entry) = pending.get_mut(&key) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            // From here on this task must not be aborted mid-write.
            entry.task = None;
            let queued = std::mem::take(&mut entry.queued);
            entry.in_flight.merge(queued);
            entry.in_flight
        };

        match self.write(key, fields).await {
            Ok(record) => {
                info!(
                    "Committed manual edits for worker {} in {} (total {})",
                    key.worker_id,
                    key.period,
                    record.total()
                );
                let mut pending = self.pending();
                if let Some(entry) = pending.get_mut(&key) {
                    entry.in_flight = ManualFields::default();
                    entry.last_error = None;
                    if entry.queued.is_empty() && entry.task.is_none() {
                        pending.remove(&key);
                    }
                }
            }
            Err(e) if !e.is_transient() => {
                warn!("Dropping edits for worker {} in {}: {}", key.worker_id, key.period, e);
                let mut pending = self.pending();
                if let Some(entry) = pending.get_mut(&key) {
                    entry.in_flight = ManualFields::default();
                    if entry.queued.is_empty() && entry.task.is_none() {
                        pending.remove(&key);
                    }
                }
            }
            Err(e) => {
                let mut pending = self.pending();
                let Some(entry) = pending.get_mut(&key) else {
                    return;
                };
                let mut restored = std::mem::take(&mut entry.in_flight);
                restored.merge(entry.queued);
                entry.queued = restored;
                entry.attempts += 1;
                entry.last_error = Some(e.to_string());

                if entry.task.is_some() {
                    // A newer edit already armed a timer; it will carry these values.
                    return;
                }
                if entry.attempts <= self.inner.settings.commit_max_retries {
                    warn!(
                        "Commit for worker {} in {} failed (attempt {}): {}; retrying",
                        key.worker_id, key.period, entry.attempts, e
                    );
                    let delay = self.inner.settings.commit_retry_delay;
                    entry.task = Some(self.schedule(key, entry.generation, delay));
                } else {
                    error!(
                        "Commit for worker {} in {} failed {} times; edits kept as unsaved: {}",
                        key.worker_id, key.period, entry.attempts, e
                    );
                }
            }
        }
    }

    async fn write(&self, key: CommitKey, fields: ManualFields) -> AppResult<SettlementRecord> {
        lifecycle::apply(
            self.inner.store.as_ref(),
            key.worker_id,
            key.period,
            Transition::EditManual(fields),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EarningsStats, FreezeRequest, ManualField};
    use crate::repository::memory::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;
    use crate::services::{
        fixtures::*,
        lifecycle::{new_draft, transition},
    };
    use rust_decimal_macros::dec;
    use tokio::time::sleep;

    fn settings() -> SettlementSettings {
        SettlementSettings {
            field_commit_window: Duration::from_millis(800),
            batch_commit_window: Duration::from_millis(1000),
            commit_retry_delay: Duration::from_millis(2000),
            commit_max_retries: 2,
        }
    }

    fn seeded_store() -> (Arc<MemoryStore>, CommitKey) {
        let store = Arc::new(MemoryStore::new());
        let ana = worker("Ana", "editor", dec!(3000));
        let mut stats = EarningsStats::zeroed(ana.id, period());
        stats.base_salary = dec!(3000);
        store.put(new_draft(&ana, period(), &stats, in_period()));
        (
            store,
            CommitKey {
                worker_id: ana.id,
                period: period(),
            },
        )
    }

    fn bonus(value: rust_decimal::Decimal) -> ManualFields {
        ManualFields::single(ManualField::ManualBonus, value)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_becomes_one_write() {
        let (store, key) = seeded_store();
        let committer = EditCommitter::new(store.clone(), settings());

        for value in [dec!(10), dec!(20), dec!(30), dec!(40), dec!(50)] {
            committer.stage(key, bonus(value), CommitWindow::Field);
            sleep(Duration::from_millis(300)).await;
        }
        assert!(store.updates().is_empty(), "nothing written while typing");
        assert_eq!(committer.overlay(key), Some(bonus(dec!(50))));

        sleep(Duration::from_secs(2)).await;

        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].manual_bonus, dec!(50));
        assert!(!committer.is_unsaved(key));
        assert_eq!(committer.overlay(key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn fields_edited_together_share_a_write() {
        let (store, key) = seeded_store();
        let committer = EditCommitter::new(store.clone(), settings());

        committer.stage(key, bonus(dec!(100)), CommitWindow::Field);
        sleep(Duration::from_millis(200)).await;
        committer.stage(
            key,
            ManualFields {
                manual_penalty: Some(dec!(30)),
                advance: Some(dec!(500)),
                ..ManualFields::default()
            },
            CommitWindow::Batch,
        );
        sleep(Duration::from_secs(3)).await;

        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].manual_bonus, dec!(100));
        assert_eq!(updates[0].manual_penalty, dec!(30));
        assert_eq!(updates[0].advance, dec!(500));
        assert_eq!(updates[0].total(), dec!(3000) + dec!(100) - dec!(30) - dec!(500));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_edit_and_retries() {
        let (store, key) = seeded_store();
        let committer = EditCommitter::new(store.clone(), settings());
        store.fail_next_writes(1);

        committer.stage(key, bonus(dec!(75)), CommitWindow::Field);
        sleep(Duration::from_millis(900)).await;

        assert!(store.updates().is_empty());
        assert!(committer.is_unsaved(key));
        assert_eq!(committer.overlay(key), Some(bonus(dec!(75))));
        assert!(committer.last_error(key).is_some());

        sleep(Duration::from_millis(2500)).await;

        assert_eq!(store.updates().len(), 1);
        assert_eq!(store.get(key.worker_id, key.period).unwrap().manual_bonus, dec!(75));
        assert!(!committer.is_unsaved(key));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_edit_unsaved_until_flushed() {
        let (store, key) = seeded_store();
        let committer = EditCommitter::new(store.clone(), settings());
        store.fail_next_writes(10);

        committer.stage(key, bonus(dec!(5)), CommitWindow::Field);
        sleep(Duration::from_secs(30)).await;

        assert!(store.updates().is_empty());
        assert!(committer.is_unsaved(key), "never silently dropped");
        assert_eq!(committer.overlay(key), Some(bonus(dec!(5))));

        store.fail_next_writes(0);
        committer.flush_now(key).await;
        assert_eq!(store.updates().len(), 1);
        assert!(!committer.is_unsaved(key));
    }

    #[tokio::test(start_paused = true)]
    async fn edits_on_locked_record_are_dropped() {
        let (store, key) = seeded_store();
        let record = store.get(key.worker_id, key.period).unwrap();
        let frozen = transition(
            &record,
            Transition::Freeze {
                values: FreezeRequest {
                    manual_bonus: dec!(0),
                    manual_penalty: dec!(0),
                    advance: dec!(0),
                },
                by: "lead".to_string(),
            },
            in_period(),
        )
        .unwrap();
        store.put(frozen.clone());
        let committer = EditCommitter::new(store.clone(), settings());

        committer.stage(key, bonus(dec!(999)), CommitWindow::Field);
        sleep(Duration::from_secs(2)).await;

        assert!(store.updates().is_empty());
        assert_eq!(store.get(key.worker_id, key.period), Some(frozen));
        assert!(!committer.is_unsaved(key));
    }

    #[tokio::test(start_paused = true)]
    async fn discard_cancels_the_pending_write() {
        let (store, key) = seeded_store();
        let committer = EditCommitter::new(store.clone(), settings());

        committer.stage(key, bonus(dec!(10)), CommitWindow::Field);
        committer.discard(key).await;
        sleep(Duration::from_secs(2)).await;

        assert!(store.updates().is_empty());
        assert_eq!(committer.overlay(key), None);
    }

    /// Holds every `update` for one worker until released.
    struct HeldStore {
        inner: Arc<MemoryStore>,
        held: Uuid,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SettlementStore for HeldStore {
        async fn find(&self, worker_id: Uuid, period: PeriodKey) -> AppResult<Option<SettlementRecord>> {
            self.inner.find(worker_id, period).await
        }

        async fn list_for_period(&self, period: PeriodKey) -> AppResult<Vec<SettlementRecord>> {
            self.inner.list_for_period(period).await
        }

        async fn insert_if_absent(&self, record: &SettlementRecord) -> AppResult<SettlementRecord> {
            self.inner.insert_if_absent(record).await
        }

        async fn update(&self, next: &SettlementRecord, current: &SettlementRecord) -> AppResult<bool> {
            if next.worker_id == self.held {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.update(next, current).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_does_not_hold_up_other_workers() {
        let (store, slow_key) = seeded_store();
        let bo = worker("Bo", "editor", dec!(2800));
        let mut stats = EarningsStats::zeroed(bo.id, period());
        stats.base_salary = dec!(2800);
        store.put(new_draft(&bo, period(), &stats, in_period()));
        let other_key = CommitKey {
            worker_id: bo.id,
            period: period(),
        };
        let held = Arc::new(HeldStore {
            inner: store.clone(),
            held: slow_key.worker_id,
            entered: Notify::new(),
            release: Notify::new(),
        });
        let committer = EditCommitter::new(held.clone(), settings());

        committer.stage(slow_key, bonus(dec!(10)), CommitWindow::Field);
        held.entered.notified().await;
        committer.stage(other_key, bonus(dec!(20)), CommitWindow::Field);

        let discarded = tokio::time::timeout(Duration::from_millis(100), committer.discard(other_key)).await;
        assert!(discarded.is_ok(), "discard waited on another worker's write");
        assert_eq!(committer.overlay(other_key), None);

        held.release.notify_one();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(store.get(slow_key.worker_id, period()).unwrap().manual_bonus, dec!(10));
        assert_eq!(store.get(bo.id, period()).unwrap().manual_bonus, dec!(0));
    }
}
