use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use amaplayer_core::config::RetryConfig;
use amaplayer_core::{Classifier, RawError};
use chrono::Utc;
use tokio::sync::Notify;

use crate::types::QueuedOperation;
use crate::{ActionError, Result};

// ─── RetryScheduler ───────────────────────────────────────────────────────

/// Runs operations with exponential backoff, tracking at most one outstanding
/// operation per key.
///
/// Issuing a new operation for a key that already has one pending supersedes
/// the old one: its in-flight attempt or backoff sleep is abandoned and its
/// future resolves with [`ActionError::Superseded`].
///
/// Cloning is cheap; clones share the pending table.
#[derive(Clone)]
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    policy: RetryConfig,
    classifier: Arc<Classifier>,
    pending: Mutex<HashMap<String, Pending>>,
    next_id: AtomicU64,
}

struct Pending {
    op: QueuedOperation,
    cancel: Arc<Notify>,
}

impl RetryScheduler {
    pub fn new(policy: RetryConfig) -> Self {
        Self::with_classifier(policy, Arc::new(Classifier::default()))
    }

    pub fn with_classifier(policy: RetryConfig, classifier: Arc<Classifier>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                policy,
                classifier,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.inner.policy
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// Non-retryable errors fail on the first attempt. Retryable ones are
    /// re-attempted after `min(base * multiplier^(n-1), max)` until
    /// `max_retries` retries have been spent, after which the last
    /// classified error is returned.
    pub async fn execute_with_retry<T, F, Fut>(&self, key: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RawError>>,
    {
        let (id, cancel) = self.inner.register(key);
        let _guard = PendingGuard {
            inner: self.inner.as_ref(),
            key,
            id,
        };
        let policy = &self.inner.policy;
        let mut retry_count = 0u32;

        loop {
            self.inner.mark_attempt(key, id, retry_count);

            let outcome = tokio::select! {
                biased;
                _ = cancel.notified() => return Err(superseded(key)),
                res = operation() => res,
            };

            let raw = match outcome {
                Ok(value) => {
                    if retry_count > 0 {
                        tracing::info!(key, retries = retry_count, "operation recovered after retries");
                    }
                    return Ok(value);
                }
                Err(raw) => raw,
            };

            let error = self.inner.classifier.classify(&raw);
            let attempts = retry_count + 1;
            if !error.retryable {
                tracing::warn!(key, kind = %error.kind, "non-retryable error, giving up");
                return Err(ActionError::Failed { error, attempts });
            }
            if retry_count >= policy.max_retries {
                tracing::warn!(
                    key,
                    kind = %error.kind,
                    attempts,
                    "retry budget exhausted"
                );
                return Err(ActionError::Failed { error, attempts });
            }

            retry_count += 1;
            let delay = policy.delay_for(retry_count);
            tracing::warn!(
                key,
                kind = %error.kind,
                retry = retry_count,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "operation failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.notified() => return Err(superseded(key)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Supersede the pending operation for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = self.inner.lock().remove(key);
        match removed {
            Some(p) => {
                tracing::debug!(key, id = p.op.id, "pending operation cancelled");
                p.cancel.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn queued(&self, key: &str) -> Option<QueuedOperation> {
        self.inner.lock().get(key).map(|p| p.op.clone())
    }
}

fn superseded(key: &str) -> ActionError {
    tracing::debug!(key, "operation superseded");
    ActionError::Superseded {
        key: key.to_string(),
    }
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, key: &str) -> (u64, Arc<Notify>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(Notify::new());
        let entry = Pending {
            op: QueuedOperation {
                id,
                key: key.to_string(),
                retry_count: 0,
                last_attempt: None,
            },
            cancel: Arc::clone(&cancel),
        };
        if let Some(prev) = self.lock().insert(key.to_string(), entry) {
            tracing::debug!(key, old = prev.op.id, new = id, "superseding pending operation");
            prev.cancel.notify_one();
        }
        (id, cancel)
    }

    fn mark_attempt(&self, key: &str, id: u64, retry_count: u32) {
        if let Some(p) = self.lock().get_mut(key) {
            if p.op.id == id {
                p.op.retry_count = retry_count;
                p.op.last_attempt = Some(Utc::now());
            }
        }
    }

    fn release(&self, key: &str, id: u64) {
        let mut pending = self.lock();
        if pending.get(key).is_some_and(|p| p.op.id == id) {
            pending.remove(key);
        }
    }
}

/// Drops the pending entry when the operation settles or its future is
/// dropped, unless a newer operation already took the slot.
struct PendingGuard<'a> {
    inner: &'a SchedulerInner,
    key: &'a str,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.release(self.key, self.id);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
