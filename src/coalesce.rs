//! Pending-request registry.
//!
//! At most one network operation is in flight per key. Later callers for the
//! same key join the existing operation and observe the same success or
//! failure. The entry is removed as soon as the operation settles, so the next
//! call after a failure starts a fresh attempt.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::FetchError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

struct PendingRequest<V> {
  /// Distinguishes registrations that reuse the same key over time.
  id: u64,
  future: SharedFetch<V>,
  refcount: usize,
}

struct Registry<V> {
  pending: HashMap<String, PendingRequest<V>>,
  next_id: u64,
}

/// Keyed registry of in-flight operations.
pub struct Coalescer<V> {
  inner: Arc<Mutex<Registry<V>>>,
}

impl<V> Clone for Coalescer<V> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<V: Clone + Send + Sync + 'static> Default for Coalescer<V> {
  fn default() -> Self {
    Self::new()
  }
}

fn lock<V>(inner: &Mutex<Registry<V>>) -> MutexGuard<'_, Registry<V>> {
  inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Clone + Send + Sync + 'static> Coalescer<V> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(Registry {
        pending: HashMap::new(),
        next_id: 0,
      })),
    }
  }

  /// Join the in-flight operation for `key`, or start one with `factory`.
  ///
  /// The operation runs on its own task, so it settles (and frees the key)
  /// even if every caller stops waiting.
  pub fn acquire<F, Fut>(&self, key: &str, factory: F) -> Pending<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
  {
    let mut registry = lock(&self.inner);

    if let Some(request) = registry.pending.get_mut(key) {
      request.refcount += 1;
      debug!(key, refcount = request.refcount, "joining in-flight request");
      return Pending {
        future: request.future.clone(),
        _lease: Lease {
          registry: Arc::clone(&self.inner),
          key: key.to_string(),
          id: request.id,
        },
      };
    }

    let id = registry.next_id;
    registry.next_id += 1;

    let operation = factory();
    let registry_handle = Arc::clone(&self.inner);
    let owned_key = key.to_string();
    let task = tokio::spawn(async move {
      let result = operation.await;
      let mut registry = lock(&registry_handle);
      if registry.pending.get(&owned_key).is_some_and(|r| r.id == id) {
        registry.pending.remove(&owned_key);
      }
      result
    });

    let future = async move {
      task
        .await
        .unwrap_or_else(|e| Err(FetchError::Network(format!("request task failed: {}", e))))
    }
    .boxed()
    .shared();

    debug!(key, "starting request");
    registry.pending.insert(
      key.to_string(),
      PendingRequest {
        id,
        future: future.clone(),
        refcount: 1,
      },
    );

    Pending {
      future,
      _lease: Lease {
        registry: Arc::clone(&self.inner),
        key: key.to_string(),
        id,
      },
    }
  }

  /// Detach the in-flight operation for `key` so the next `acquire` starts a
  /// new one. Callers already waiting on it still receive its result.
  pub fn forget(&self, key: &str) -> bool {
    let removed = lock(&self.inner).pending.remove(key).is_some();
    if removed {
      debug!(key, "detached in-flight request");
    }
    removed
  }

  /// Whether an operation for `key` is outstanding.
  pub fn is_pending(&self, key: &str) -> bool {
    lock(&self.inner).pending.contains_key(key)
  }

  /// Number of callers currently waiting on `key`.
  pub fn refcount(&self, key: &str) -> Option<usize> {
    lock(&self.inner).pending.get(key).map(|r| r.refcount)
  }

  /// Number of outstanding operations.
  pub fn len(&self) -> usize {
    lock(&self.inner).pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A caller's share of an in-flight operation.
pub struct Pending<V> {
  future: SharedFetch<V>,
  _lease: Lease<V>,
}

impl<V: Clone> Future for Pending<V> {
  type Output = Result<V, FetchError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.future.poll_unpin(cx)
  }
}

/// Decrements the refcount when a caller finishes or gives up.
struct Lease<V> {
  registry: Arc<Mutex<Registry<V>>>,
  key: String,
  id: u64,
}

impl<V> Drop for Lease<V> {
  fn drop(&mut self) {
    let mut registry = lock(&self.registry);
    if let Some(request) = registry.pending.get_mut(&self.key) {
      if request.id == self.id {
        request.refcount = request.refcount.saturating_sub(1);
      }
    }
  }
}
