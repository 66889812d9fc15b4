#![warn(missing_docs)]
//! # motility-store
//!
//! ## Purpose
//! Authoritative in-process registry of analysis records and the cached
//! server history.
//!
//! ## Responsibilities
//! - Own every [`AnalysisRecord`] and apply all mutations through one lock.
//! - Enforce the record lifecycle on every update.
//! - Persist both collections after each mutation and restore them on open.
//! - Notify subscribers after each mutation.
//!
//! ## Data flow
//! Manager -> [`LifecycleStore::update`] -> [`AnalysisRecord::apply`] ->
//! [`KeyValueStore::set`] -> [`StoreEvent`] to observers.
//!
//! ## Ownership and lifetimes
//! The store is shared by `Arc`. Readers get clones; no reference into the
//! collection escapes the lock. Events are queued under the lock in mutation
//! order and delivered after it is released, one at a time, so observers see
//! mutations in the order they were applied and may call back into the store.
//!
//! ## Error model
//! Rejected updates return [`StoreError`] and leave the record untouched.
//! Persistence failures are logged and never returned; the in-memory state
//! stays authoritative.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use motility_core::{
    AnalysisParameters, AnalysisRecord, AnalysisState, CoreError, HistoryEntry, InputRef,
    RecordId, RecordPatch,
};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod persist;

pub use persist::{JsonFileKeyValueStore, KeyValueStore, MemoryKeyValueStore, PersistError};

/// Storage key of the record collection.
pub const ANALYSES_KEY: &str = "analyses";

/// Storage key of the cached server history.
pub const HISTORY_KEY: &str = "analysis_history";

/// Change notification delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A record was created.
    Created(AnalysisRecord),
    /// A record changed; carries the new value.
    Updated(AnalysisRecord),
    /// A record was removed.
    Removed(RecordId),
    /// Every record and the history were dropped.
    Cleared,
    /// The history cache was replaced; carries the new entry count.
    HistoryReplaced(usize),
}

impl StoreEvent {
    /// Record id affected by the event, if any.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Self::Created(record) | Self::Updated(record) => Some(&record.id),
            Self::Removed(id) => Some(id),
            Self::Cleared | Self::HistoryReplaced(_) => None,
        }
    }
}

/// Receives [`StoreEvent`]s.
pub trait RecordObserver: Send + Sync {
    /// Called once per mutation, outside the store lock.
    fn on_event(&self, event: &StoreEvent);

    /// Returns `true` once the observer can no longer receive events; closed
    /// observers are dropped after the next notification.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> RecordObserver for F
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event)
    }
}

/// Handle returned by [`LifecycleStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Rejected store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The patch breaks the record lifecycle.
    #[error("update rejected for record {id}: {source}")]
    Rejected {
        /// Target record.
        id: RecordId,
        /// Reason.
        #[source]
        source: CoreError,
    },
}

#[derive(Debug, Default)]
struct Collections {
    records: Vec<AnalysisRecord>,
    history: Vec<HistoryEntry>,
}

// Pending events in mutation order. `draining` marks the one caller
// currently delivering them.
#[derive(Default)]
struct Outbox {
    queue: VecDeque<StoreEvent>,
    draining: bool,
}

/// Registry of analysis records.
pub struct LifecycleStore {
    state: Mutex<Collections>,
    backend: Arc<dyn KeyValueStore>,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn RecordObserver>)>>,
    outbox: Mutex<Outbox>,
    next_subscription: AtomicU64,
}

impl LifecycleStore {
    /// Opens a store over `backend`, restoring the last persisted state.
    ///
    /// Unreadable blobs start empty and individually invalid records are
    /// skipped; both cases are logged.
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        let records: Vec<AnalysisRecord> = load_collection(backend.as_ref(), ANALYSES_KEY)
            .into_iter()
            .filter(|record: &AnalysisRecord| match record.validate() {
                Ok(()) => true,
                Err(error) => {
                    warn!(record_id = %record.id, error = %error, "skipping invalid persisted record");
                    false
                }
            })
            .collect();
        let history = load_collection(backend.as_ref(), HISTORY_KEY);
        info!(
            records = records.len(),
            history = history.len(),
            "lifecycle store restored"
        );

        let mut collections = Collections { records, history };
        sort_newest_first(&mut collections.records);

        Self {
            state: Mutex::new(collections),
            backend,
            observers: Mutex::new(Vec::new()),
            outbox: Mutex::new(Outbox::default()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Opens an empty, non-durable store.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Creates a `Pending` record at the front of the collection.
    pub fn create(&self, input_ref: InputRef, parameters: AnalysisParameters) -> AnalysisRecord {
        let record = AnalysisRecord::new(input_ref, parameters, Utc::now());
        let mut state = self.state.lock();
        state.records.insert(0, record.clone());
        self.persist_records(&state);
        info!(record_id = %record.id, "analysis record created");
        self.publish(state, StoreEvent::Created(record.clone()));
        record
    }

    /// Merges `patch` into the record `id`.
    ///
    /// Returns `Ok(None)` for an unknown id (logged, not an error).
    ///
    /// # Errors
    /// Returns [`StoreError::Rejected`] when the record is terminal or the
    /// patch breaks the lifecycle; the record is left unchanged.
    pub fn update(
        &self,
        id: &RecordId,
        patch: RecordPatch,
    ) -> Result<Option<AnalysisRecord>, StoreError> {
        let mut state = self.state.lock();
        let Some(record) = state.records.iter_mut().find(|record| &record.id == id) else {
            warn!(record_id = %id, "update for unknown record ignored");
            return Ok(None);
        };

        let previous = record.state;
        if let Err(source) = record.apply(patch, Utc::now()) {
            warn!(record_id = %id, state = %previous, error = %source, "record update rejected");
            return Err(StoreError::Rejected {
                id: id.clone(),
                source,
            });
        }

        let updated = record.clone();
        if updated.state != previous {
            info!(
                record_id = %id,
                from = %previous,
                to = %updated.state,
                "analysis state changed"
            );
        } else {
            debug!(record_id = %id, progress = updated.progress, "analysis record updated");
        }
        self.persist_records(&state);
        self.publish(state, StoreEvent::Updated(updated.clone()));
        Ok(Some(updated))
    }

    /// Removes the record `id`, returning it when it existed.
    pub fn remove(&self, id: &RecordId) -> Option<AnalysisRecord> {
        let mut state = self.state.lock();
        let index = state.records.iter().position(|record| &record.id == id)?;
        let removed = state.records.remove(index);
        self.persist_records(&state);
        info!(record_id = %id, "analysis record removed");
        self.publish(state, StoreEvent::Removed(id.clone()));
        Some(removed)
    }

    /// Returns a copy of the record `id`.
    pub fn get(&self, id: &RecordId) -> Option<AnalysisRecord> {
        self.state
            .lock()
            .records
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }

    /// All records, most recently created first.
    pub fn list(&self) -> Vec<AnalysisRecord> {
        self.filtered(|_| true)
    }

    /// Records in `Completed`.
    pub fn completed(&self) -> Vec<AnalysisRecord> {
        self.filtered(|record| record.state == AnalysisState::Completed)
    }

    /// Records in `Failed`.
    pub fn failed(&self) -> Vec<AnalysisRecord> {
        self.filtered(|record| record.state == AnalysisState::Failed)
    }

    /// Records not yet terminal.
    pub fn in_progress(&self) -> Vec<AnalysisRecord> {
        self.filtered(|record| !record.is_terminal())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns `true` when no record exists.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Cached server history.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().history.clone()
    }

    /// Replaces the cached server history.
    pub fn replace_history(&self, entries: Vec<HistoryEntry>) {
        let count = entries.len();
        let mut state = self.state.lock();
        state.history = entries;
        persist_collection(self.backend.as_ref(), HISTORY_KEY, &state.history);
        debug!(entries = count, "analysis history replaced");
        self.publish(state, StoreEvent::HistoryReplaced(count));
    }

    /// Drops every record and the history, including their persisted copies.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.history.clear();
        for key in [ANALYSES_KEY, HISTORY_KEY] {
            if let Err(error) = self.backend.remove(key) {
                warn!(key, error = %error, "failed to clear persisted collection");
            }
        }
        info!("lifecycle store cleared");
        self.publish(state, StoreEvent::Cleared);
    }

    /// Registers `observer` for every subsequent event.
    pub fn subscribe(&self, observer: Arc<dyn RecordObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    /// Removes a subscription. Returns `false` when it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Subscribes through an unbounded channel.
    ///
    /// The subscription ends by itself once the receiver is dropped and the
    /// next event fails to send.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<StoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(ChannelObserver { tx }));
        (id, rx)
    }

    fn filtered(&self, keep: impl Fn(&AnalysisRecord) -> bool) -> Vec<AnalysisRecord> {
        let mut records: Vec<AnalysisRecord> = self
            .state
            .lock()
            .records
            .iter()
            .filter(|record| keep(record))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        records
    }

    fn persist_records(&self, state: &Collections) {
        persist_collection(self.backend.as_ref(), ANALYSES_KEY, &state.records);
    }

    /// Queues `event` while the mutation's lock is still held, then releases
    /// the lock and delivers pending events.
    fn publish(&self, state: MutexGuard<'_, Collections>, event: StoreEvent) {
        self.outbox.lock().queue.push_back(event);
        drop(state);
        self.drain_outbox();
    }

    // One caller delivers at a time; the others leave their events queued
    // for it. A mutation made from inside an observer only queues.
    fn drain_outbox(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }
        loop {
            let next = {
                let mut outbox = self.outbox.lock();
                let next = outbox.queue.pop_front();
                if next.is_none() {
                    outbox.draining = false;
                }
                next
            };
            match next {
                Some(event) => self.notify(&event),
                None => return,
            }
        }
    }

    fn notify(&self, event: &StoreEvent) {
        let observers: Vec<Arc<dyn RecordObserver>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_event(event);
        }
        self.observers
            .lock()
            .retain(|(_, observer)| !observer.is_closed());
    }
}

impl std::fmt::Debug for LifecycleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleStore")
            .field("records", &self.state.lock().records.len())
            .field("observers", &self.observers.lock().len())
            .finish_non_exhaustive()
    }
}

struct ChannelObserver {
    tx: mpsc::UnboundedSender<StoreEvent>,
}

impl RecordObserver for ChannelObserver {
    fn on_event(&self, event: &StoreEvent) {
        let _ = self.tx.send(event.clone());
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn sort_newest_first(records: &mut [AnalysisRecord]) {
    records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
}

fn persist_collection<T: Serialize>(backend: &dyn KeyValueStore, key: &str, items: &[T]) {
    let result = serde_json::to_string(items)
        .map_err(PersistError::from)
        .and_then(|encoded| backend.set(key, &encoded));
    if let Err(error) = result {
        warn!(key, error = %error, "failed to persist collection");
    }
}

fn load_collection<T: DeserializeOwned>(backend: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let raw = match backend.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(error) => {
            warn!(key, error = %error, "failed to read persisted collection");
            return Vec::new();
        }
    };

    let items: Vec<Value> = match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(error) => {
            warn!(key, error = %error, "persisted collection is not a JSON array");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                warn!(key, error = %error, "skipping unreadable persisted item");
                None
            }
        })
        .collect()
}
