use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Values the optimistic store can hold. Blanket-implemented.
pub trait StateValue: Clone + Send + Sync + fmt::Debug + 'static {}

impl<T: Clone + Send + Sync + fmt::Debug + 'static> StateValue for T {}

// ─── ActionRequest ────────────────────────────────────────────────────────

/// One user-triggered state change. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest<V> {
    pub key: String,
    pub desired: V,
    /// Monotonic across the whole store; higher means issued later.
    pub seq: u64,
    pub requested_at: DateTime<Utc>,
}

// ─── QueuedOperation ──────────────────────────────────────────────────────

/// The scheduler's view of an outstanding operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: u64,
    pub key: String,
    /// Retries performed so far (0 while the first attempt runs).
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
}

// ─── EntityState ──────────────────────────────────────────────────────────

/// What the UI renders for one entity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState<V> {
    pub committed: V,
    pub loading: bool,
    pub error: Option<String>,
}

impl<V> EntityState<V> {
    pub fn settled(committed: V) -> Self {
        Self {
            committed,
            loading: false,
            error: None,
        }
    }
}

/// Broadcast to subscribers whenever an [`EntityState`] changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange<V> {
    pub key: String,
    pub state: EntityState<V>,
}
