use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use amaplayer_core::config::PipelineConfig;
use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::backend::DurableWrite;
use crate::retry::RetryScheduler;
use crate::types::{ActionRequest, EntityState, StateChange, StateValue};
use crate::{ActionError, Result};

const EVENT_CAPACITY: usize = 256;

// ─── OptimisticStore ──────────────────────────────────────────────────────

/// Per-entity UI state with optimistic updates.
///
/// Every action applies its tentative value synchronously, then schedules the
/// durable write after the debounce window. Only the most recently *issued*
/// request for a key may settle its state; older results are discarded no
/// matter when they complete. A terminal failure reverts the entity to the
/// last value the backend confirmed.
///
/// The store is an ordinary value: build one at the application root and
/// clone it where needed. Clones share state.
pub struct OptimisticStore<V> {
    inner: Arc<StoreInner<V>>,
}

impl<V> Clone for OptimisticStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    writer: Arc<dyn DurableWrite<V>>,
    scheduler: RetryScheduler,
    debounce: Duration,
    seq: AtomicU64,
    events: broadcast::Sender<StateChange<V>>,
    changed: Notify,
    handle: Handle,
}

struct Slot<V> {
    state: EntityState<V>,
    /// Last value the backend acknowledged; the rollback target.
    confirmed: V,
    confirmed_seq: u64,
    /// Sequence number of the most recently issued request.
    latest: u64,
}

impl<V: StateValue> OptimisticStore<V> {
    /// Build a store using `config.retry` and `config.debounce`.
    ///
    /// Must be called from within a tokio runtime; the runtime handle is
    /// captured so that [`toggle`](Self::toggle) and friends can stay
    /// synchronous.
    pub fn new(writer: impl DurableWrite<V>, config: &PipelineConfig) -> Result<Self> {
        Self::with_scheduler(
            writer,
            RetryScheduler::new(config.retry.clone()),
            config.debounce.window(),
        )
    }

    pub fn with_scheduler(
        writer: impl DurableWrite<V>,
        scheduler: RetryScheduler,
        debounce: Duration,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| ActionError::NoRuntime)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(StoreInner {
                slots: Mutex::new(HashMap::new()),
                writer: Arc::new(writer),
                scheduler,
                debounce,
                seq: AtomicU64::new(0),
                events,
                changed: Notify::new(),
                handle,
            }),
        })
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.inner.scheduler
    }

    /// Load an authoritative value fetched from the backend. Ignored while a
    /// write for `key` is outstanding; returns whether it was applied.
    pub fn seed(&self, key: &str, value: V) -> bool {
        let state = {
            let mut slots = self.inner.lock();
            match slots.get_mut(key) {
                Some(slot) if slot.state.loading => return false,
                Some(slot) => {
                    slot.confirmed = value.clone();
                    slot.state = EntityState::settled(value);
                    slot.state.clone()
                }
                None => {
                    let slot = Slot::new(value);
                    let state = slot.state.clone();
                    slots.insert(key.to_string(), slot);
                    state
                }
            }
        };
        self.inner.publish(key, state);
        true
    }

    /// Set `key` to `tentative` immediately and schedule the durable write.
    /// A key seen for the first time rolls back to `V::default()`.
    pub fn apply_optimistic(&self, key: &str, tentative: V) -> EntityState<V>
    where
        V: Default,
    {
        self.apply(key, tentative, V::default)
    }

    fn apply(&self, key: &str, tentative: V, baseline: impl FnOnce() -> V) -> EntityState<V> {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request = ActionRequest {
            key: key.to_string(),
            desired: tentative.clone(),
            seq,
            requested_at: Utc::now(),
        };

        let state = {
            let mut slots = self.inner.lock();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(baseline()));
            slot.latest = seq;
            slot.state = EntityState {
                committed: tentative,
                loading: true,
                error: None,
            };
            slot.state.clone()
        };

        // A new action restarts the debounce window and the retry budget.
        if self.inner.scheduler.cancel(key) {
            tracing::debug!(key, seq, "in-flight write superseded by new action");
        }
        self.inner.publish(key, state.clone());
        self.spawn_write(request);
        state
    }

    fn spawn_write(&self, request: ActionRequest<V>) {
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if !inner.is_latest(&request.key, request.seq) {
                tracing::trace!(key = %request.key, seq = request.seq, "debounced");
                return;
            }

            let key = request.key.as_str();
            let writer = Arc::clone(&inner.writer);
            tracing::debug!(key, seq = request.seq, desired = ?request.desired, "issuing durable write");
            let result = inner
                .scheduler
                .execute_with_retry(key, || writer.write(key, request.desired.clone()))
                .await;
            inner.reconcile(&request, result);
        });
    }

    pub fn get(&self, key: &str) -> Option<EntityState<V>> {
        self.inner.lock().get(key).map(|s| s.state.clone())
    }

    /// All entity states, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, EntityState<V>> {
        self.inner
            .lock()
            .iter()
            .map(|(k, s)| (k.clone(), s.state.clone()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange<V>> {
        self.inner.events.subscribe()
    }

    /// Stream of state changes. Changes missed by a lagging consumer are
    /// skipped; the next one still carries the full state.
    pub fn changes(&self) -> impl Stream<Item = StateChange<V>> + Send + Unpin + 'static {
        BroadcastStream::new(self.inner.events.subscribe()).filter_map(|r| r.ok())
    }

    /// Wait until `key` is no longer loading and return its state.
    pub async fn settled(&self, key: &str) -> Option<EntityState<V>> {
        loop {
            let notified = self.inner.changed.notified();
            match self.get(key) {
                None => return None,
                Some(state) if !state.loading => return Some(state),
                Some(_) => {}
            }
            notified.await;
        }
    }
}

impl OptimisticStore<bool> {
    /// Flip a boolean entity (a like, a follow). `current` is the value the UI
    /// is showing; it seeds the rollback target for keys not seen before.
    pub fn toggle(&self, key: &str, current: bool) -> EntityState<bool> {
        self.apply(key, !current, || current)
    }
}

impl<V> Slot<V>
where
    V: Clone,
{
    fn new(value: V) -> Self {
        Self {
            state: EntityState::settled(value.clone()),
            confirmed: value,
            confirmed_seq: 0,
            latest: 0,
        }
    }
}

impl<V: StateValue> StoreInner<V> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_latest(&self, key: &str, seq: u64) -> bool {
        self.lock().get(key).is_some_and(|s| s.latest == seq)
    }

    fn publish(&self, key: &str, state: EntityState<V>) {
        // No receivers is fine.
        let _ = self.events.send(StateChange {
            key: key.to_string(),
            state,
        });
        self.changed.notify_waiters();
    }

    fn reconcile(&self, request: &ActionRequest<V>, result: Result<V>) {
        let key = request.key.as_str();
        let state = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(key) else {
                return;
            };
            let current = slot.latest == request.seq;

            match result {
                Ok(authoritative) => {
                    if request.seq > slot.confirmed_seq {
                        slot.confirmed = authoritative.clone();
                        slot.confirmed_seq = request.seq;
                    }
                    if !current {
                        tracing::debug!(key, seq = request.seq, "stale success ignored");
                        return;
                    }
                    slot.state = EntityState::settled(authoritative);
                }
                // A newer apply on this store already owns the slot. If this
                // request is still the latest, the cancel came from elsewhere
                // (a direct scheduler cancel or another store sharing the
                // scheduler) and nothing else will settle it.
                Err(ActionError::Superseded { .. }) if !current => return,
                Err(err) => {
                    if !current {
                        tracing::debug!(key, seq = request.seq, "stale failure ignored");
                        return;
                    }
                    tracing::warn!(key, error = %err, "write failed, rolling back");
                    slot.state = EntityState {
                        committed: slot.confirmed.clone(),
                        loading: false,
                        error: Some(err.user_message()),
                    };
                }
            }
            slot.state.clone()
        };
        self.publish(key, state);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
