//! Deferred batch loader: coalesces many concurrent single-key lookups
//! into one batched fetch.
//!
//! [`BatchLoader::load`] has the same shape as a direct single-key
//! lookup, but internally accumulates every call issued within an
//! explicit batching window, deduplicates identical keys, issues one
//! batched fetch for the distinct key set, and resolves each caller
//! with its own result. The explicit window replaces reliance on a
//! scheduler tick, so the behavior is reproducible across concurrency
//! models; [`BatchLoader::flush`] closes the current window early.
//!
//! This is a generic coalescing primitive, not specific to any one
//! entity type.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use crate::error::{DomainError, DomainResult};

/// The batched fetch behind a [`BatchLoader`].
#[async_trait]
pub trait BatchFetch<K, V>: Send + Sync {
    /// Fetches values for a deduplicated key set. The result must be
    /// positionally aligned with `keys`; a key with no backing row
    /// maps to `None`.
    async fn fetch_batch(&self, keys: &[K]) -> DomainResult<Vec<Option<V>>>;
}

/// Failure distributed to every caller of a batch. Kept as a small
/// clonable type so one failure can fan out to all waiters.
#[derive(Debug, Clone)]
enum BatchError {
    Mismatch { expected: usize, actual: usize },
    Fetch(String),
    Dropped,
}

impl From<BatchError> for DomainError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Mismatch { expected, actual } => {
                DomainError::BatchMismatch { expected, actual }
            }
            BatchError::Fetch(message) => DomainError::BatchFetchFailed { message },
            BatchError::Dropped => DomainError::BatchFetchFailed {
                message: "batch task dropped before completing".to_string(),
            },
        }
    }
}

type Waiters<V> = Vec<oneshot::Sender<Result<Option<V>, BatchError>>>;

struct LoaderInner<K, V> {
    fetch: Arc<dyn BatchFetch<K, V>>,
    pending: Mutex<HashMap<K, Waiters<V>>>,
    window: Duration,
}

/// Coalescing wrapper around a batched fetch.
///
/// Cheap to clone; clones share the same pending window.
pub struct BatchLoader<K, V> {
    inner: Arc<LoaderInner<K, V>>,
}

impl<K, V> Clone for BatchLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(fetch: Arc<dyn BatchFetch<K, V>>, window: Duration) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                fetch,
                pending: Mutex::new(HashMap::new()),
                window,
            }),
        }
    }

    /// Single-key lookup. All calls issued within one batching window
    /// share a single underlying `fetch_batch`; duplicate keys share
    /// one slot in it. Callers must not assume ordering across
    /// windows.
    pub async fn load(&self, key: K) -> DomainResult<Option<V>> {
        let (tx, rx) = oneshot::channel();
        let opens_window = {
            let mut pending = self.inner.pending.lock().await;
            let first = pending.is_empty();
            pending.entry(key).or_default().push(tx);
            first
        };

        // The first key of a window schedules its flush.
        if opens_window {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.window).await;
                flush_pending(&inner).await;
            });
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(BatchError::Dropped.into()),
        }
    }

    /// Closes the current window immediately, running the batched
    /// fetch for everything pending.
    pub async fn flush(&self) {
        flush_pending(&self.inner).await;
    }
}

async fn flush_pending<K, V>(inner: &Arc<LoaderInner<K, V>>)
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    let batch = {
        let mut pending = inner.pending.lock().await;
        std::mem::take(&mut *pending)
    };
    if batch.is_empty() {
        return;
    }

    let keys: Vec<K> = batch.keys().cloned().collect();
    match inner.fetch.fetch_batch(&keys).await {
        Ok(values) if values.len() == keys.len() => {
            let mut by_key: HashMap<K, Option<V>> = keys.into_iter().zip(values).collect();
            for (key, waiters) in batch {
                let value = by_key.remove(&key).unwrap_or(None);
                for tx in waiters {
                    let _ = tx.send(Ok(value.clone()));
                }
            }
        }
        Ok(values) => {
            // A mismatched result count poisons the whole batch.
            let err = BatchError::Mismatch {
                expected: keys.len(),
                actual: values.len(),
            };
            fail_all(batch, err);
        }
        Err(e) => {
            let err = BatchError::Fetch(e.to_string());
            fail_all(batch, err);
        }
    }
}

fn fail_all<K, V>(batch: HashMap<K, Waiters<V>>, err: BatchError) {
    for waiters in batch.into_values() {
        for tx in waiters {
            let _ = tx.send(Err(err.clone()));
        }
    }
}
