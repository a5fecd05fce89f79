use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use amaplayer_core::search::SearchQuery;
use amaplayer_core::types::Role;
use amaplayer_core::RawError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::types::StateValue;

// ─── Seams ────────────────────────────────────────────────────────────────

/// The durable write behind an optimistic update: persist `desired` for `key`
/// and resolve with the value the backend actually stored.
pub trait DurableWrite<V>: Send + Sync + 'static {
    fn write(&self, key: &str, desired: V) -> BoxFuture<'static, Result<V, RawError>>;
}

impl<V, F> DurableWrite<V> for F
where
    F: Fn(&str, V) -> BoxFuture<'static, Result<V, RawError>> + Send + Sync + 'static,
{
    fn write(&self, key: &str, desired: V) -> BoxFuture<'static, Result<V, RawError>> {
        self(key, desired)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub sports: Vec<String>,
}

/// Runs a built query against the document store.
pub trait SearchBackend: Send + Sync + 'static {
    fn run(&self, query: &SearchQuery) -> BoxFuture<'static, Result<Vec<SearchHit>, RawError>>;
}

// ─── ScriptedBackend ──────────────────────────────────────────────────────

/// One scripted response for the next write.
#[derive(Debug, Clone)]
pub enum Outcome<V> {
    Fail(RawError),
    /// Succeed with a server-chosen value instead of the requested one.
    Resolve(V),
    /// Succeed with exactly the requested value.
    Echo,
}

/// A write the backend received.
#[derive(Debug, Clone)]
pub struct WriteCall<V> {
    pub key: String,
    pub desired: V,
    pub at: Instant,
}

struct Script<V> {
    outcomes: VecDeque<Outcome<V>>,
    calls: Vec<WriteCall<V>>,
}

/// In-memory [`DurableWrite`] that replays a script of outcomes and records
/// every call. Once the script runs dry every write echoes its value.
#[derive(Clone)]
pub struct ScriptedBackend<V> {
    script: Arc<Mutex<Script<V>>>,
    latency: Duration,
}

impl<V: StateValue> ScriptedBackend<V> {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome<V>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                outcomes: outcomes.into_iter().collect(),
                calls: Vec::new(),
            })),
            latency: Duration::ZERO,
        }
    }

    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, outcome: Outcome<V>) {
        self.lock().outcomes.push_back(outcome);
    }

    pub fn calls(&self) -> Vec<WriteCall<V>> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script<V>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: StateValue> DurableWrite<V> for ScriptedBackend<V> {
    fn write(&self, key: &str, desired: V) -> BoxFuture<'static, Result<V, RawError>> {
        let outcome = {
            let mut script = self.lock();
            script.calls.push(WriteCall {
                key: key.to_string(),
                desired: desired.clone(),
                at: Instant::now(),
            });
            script.outcomes.pop_front().unwrap_or(Outcome::Echo)
        };
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match outcome {
                Outcome::Fail(raw) => Err(raw),
                Outcome::Resolve(v) => Ok(v),
                Outcome::Echo => Ok(desired),
            }
        })
    }
}
