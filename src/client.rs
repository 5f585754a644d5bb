//! Fetch orchestrator.
//!
//! `QueryClient` owns the cache store and the pending-request registry for one
//! item type. It is constructed explicitly and handed to consumers; tests
//! build a fresh one each. Consumers call `request_fetch` as often as they
//! like (every tick, every parameter change) and read `state`; the staleness
//! policy turns redundant calls into no-ops.
//!
//! Results are committed in relevance order, not arrival order: a response is
//! applied only if the signature that triggered it is still the consumer's
//! current signature. Failures never touch cached data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::FutureExt;
use futures::TryFutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{sort_by_label, CacheEntry, CacheStore, Cacheable, Payload, SessionStorage};
use crate::coalesce::{Coalescer, Pending};
use crate::error::{FetchError, QueryError};
use crate::params::{QueryParams, Signature};
use crate::policy::{self, ArrivalTracker, FetchDecision, FetchMode, NavigationState};
use crate::query::{LoadStatus, QueryState};
use crate::resource::{request_key, Resource, ResourceId, ResourceKind};
use crate::source::DataSource;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(5);

/// Tunables for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
  /// Fixed deadline for every network call
  pub timeout: Duration,
  /// How long a failed signature is left alone unless the user navigates
  /// back in or the resource is invalidated
  pub retry_cooldown: Duration,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self {
      timeout: DEFAULT_TIMEOUT,
      retry_cooldown: DEFAULT_RETRY_COOLDOWN,
    }
  }
}

type Shared<T> = Arc<Payload<T>>;

#[derive(Debug, Clone)]
struct ActiveFetch {
  signature: Signature,
  mode: FetchMode,
}

/// Per-resource bookkeeping owned by the orchestrator.
#[derive(Debug, Default)]
struct Slot {
  arrivals: ArrivalTracker,
  /// The consumer's most recent signature
  current: Option<Signature>,
  active: Option<ActiveFetch>,
  error: Option<String>,
  last_failure: Option<(Signature, Instant)>,
  /// Bumped on invalidation so in-flight results from before it are dropped
  epoch: u64,
  /// Endpoint of the last request, for detaching in-flight requests
  endpoint: Option<String>,
  subscribers: usize,
}

struct Inner<T> {
  source: Arc<dyn DataSource<T>>,
  store: CacheStore<T>,
  coalescer: Coalescer<Shared<T>>,
  slots: Mutex<HashMap<ResourceId, Slot>>,
  options: ClientOptions,
}

/// Query cache and fetch coordination for items of type `T`.
pub struct QueryClient<T> {
  inner: Arc<Inner<T>>,
}

impl<T> Clone for QueryClient<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

/// Handle on a fetch started by `request_fetch`. Dropping it does not cancel
/// anything.
#[derive(Debug)]
pub struct FetchHandle {
  mode: FetchMode,
  task: JoinHandle<()>,
}

impl FetchHandle {
  pub fn mode(&self) -> FetchMode {
    self.mode
  }

  /// Wait until the result has been committed or discarded.
  pub async fn join(self) {
    if let Err(e) = self.task.await {
      warn!(error = %e, "fetch task failed");
    }
  }
}

impl<T: Cacheable> QueryClient<T> {
  /// Client with a memory-only store.
  pub fn new(source: Arc<dyn DataSource<T>>, options: ClientOptions) -> Self {
    Self::with_store(source, CacheStore::new(), options)
  }

  /// Client whose reference data is mirrored to session storage.
  pub fn with_storage(
    source: Arc<dyn DataSource<T>>,
    storage: Arc<dyn SessionStorage>,
    options: ClientOptions,
  ) -> Self {
    Self::with_store(source, CacheStore::with_storage(storage), options)
  }

  fn with_store(
    source: Arc<dyn DataSource<T>>,
    store: CacheStore<T>,
    options: ClientOptions,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        source,
        store,
        coalescer: Coalescer::new(),
        slots: Mutex::new(HashMap::new()),
        options,
      }),
    }
  }

  fn slots(&self) -> MutexGuard<'_, HashMap<ResourceId, Slot>> {
    self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn options(&self) -> ClientOptions {
    self.inner.options
  }

  /// Read-only view of the cache store.
  pub fn store(&self) -> &CacheStore<T> {
    &self.inner.store
  }

  /// Load persisted reference data for `resources`. Call once at startup.
  pub fn hydrate(&self, resources: &[Resource]) -> usize {
    resources
      .iter()
      .filter_map(|r| Some((r, r.kind.ttl()?)))
      .filter(|(r, ttl)| self.inner.store.hydrate(&r.id, *ttl))
      .count()
  }

  /// Evaluate the staleness policy and start a fetch if one is warranted.
  ///
  /// Idempotent: returns `Ok(None)` when nothing needs fetching, including
  /// when a fetch for the same signature is already in flight.
  pub fn request_fetch(
    &self,
    resource: &Resource,
    params: &QueryParams,
    nav: &NavigationState,
  ) -> Result<Option<FetchHandle>, QueryError> {
    validate(resource)?;

    let signature = match resource.kind {
      ResourceKind::Paginated => params.signature(),
      ResourceKind::Reference { .. } => Signature::empty(),
    };

    let mut slots = self.slots();
    let slot = slots.entry(resource.id.clone()).or_default();
    let just_navigated_in = slot.arrivals.observe(nav);
    slot.current = Some(signature.clone());
    slot.endpoint = Some(resource.endpoint.clone());

    let mut entry = self.inner.store.get(&resource.id);
    if entry.is_none() {
      if let ResourceKind::Reference { ttl } = resource.kind {
        if self.inner.store.hydrate(&resource.id, ttl) {
          entry = self.inner.store.get(&resource.id);
        }
      }
    }

    let decision = match resource.kind {
      ResourceKind::Paginated => policy::decide(&signature, entry.as_ref(), just_navigated_in),
      ResourceKind::Reference { .. } => policy::decide_ttl(entry.as_ref(), Utc::now()),
    };
    let FetchDecision::Fetch(mode) = decision else {
      return Ok(None);
    };

    if slot
      .active
      .as_ref()
      .is_some_and(|a| a.signature == signature)
    {
      debug!(resource = %resource.id, %signature, "fetch already in flight");
      return Ok(None);
    }

    if !just_navigated_in {
      if let Some((failed, at)) = &slot.last_failure {
        if *failed == signature && at.elapsed() < self.inner.options.retry_cooldown {
          debug!(resource = %resource.id, %signature, "retry suppressed during cooldown");
          return Ok(None);
        }
      }
    }

    debug!(resource = %resource.id, %signature, ?mode, just_navigated_in, "starting fetch");
    slot.active = Some(ActiveFetch {
      signature: signature.clone(),
      mode,
    });
    let epoch = slot.epoch;
    drop(slots);

    let pending = self.start(resource, &signature, params);
    let client = self.clone();
    let resource = resource.clone();
    let task = tokio::spawn(async move {
      let result = pending.await;
      client.commit(&resource, signature, epoch, result);
    });

    Ok(Some(FetchHandle { mode, task }))
  }

  /// Snapshot for consumers.
  pub fn state(&self, resource: &ResourceId) -> QueryState<T> {
    let slots = self.slots();
    let slot = slots.get(resource);
    let entry = self.inner.store.get(resource);
    let has_data = entry.as_ref().is_some_and(|e| !e.is_empty());

    QueryState {
      status: LoadStatus::derive(
        slot.and_then(|s| s.active.as_ref()).map(|a| a.mode),
        has_data,
      ),
      data: entry.map(|e| e.payload),
      error: slot.and_then(|s| s.error.clone()),
    }
  }

  /// Forget the cached result so the next `request_fetch` fetches regardless
  /// of signature. Results still in flight are dropped on arrival and never
  /// joined by later requests.
  pub fn invalidate(&self, resource: &ResourceId) {
    let mut slots = self.slots();
    if let Some(slot) = slots.get_mut(resource) {
      if let Some(endpoint) = &slot.endpoint {
        let signatures = slot.active.iter().map(|a| &a.signature).chain(&slot.current);
        for signature in signatures {
          self.inner.coalescer.forget(&request_key(endpoint, signature));
        }
      }
      slot.epoch += 1;
      slot.active = None;
      slot.error = None;
      slot.last_failure = None;
    }
    self.inner.store.invalidate(resource);
    info!(%resource, "invalidated");
  }

  /// Register a consumer of `resource`.
  pub fn subscribe(&self, resource: &Resource) -> Subscription<T> {
    self
      .slots()
      .entry(resource.id.clone())
      .or_default()
      .subscribers += 1;
    Subscription {
      client: self.clone(),
      resource: resource.clone(),
    }
  }

  fn unsubscribe(&self, resource: &Resource) {
    let mut slots = self.slots();
    let Some(slot) = slots.get_mut(&resource.id) else {
      return;
    };
    slot.subscribers = slot.subscribers.saturating_sub(1);
    if slot.subscribers == 0 && resource.is_reference() {
      debug!(resource = %resource.id, "last subscriber left, releasing entry");
      self.inner.store.evict(&resource.id);
    }
  }

  /// Number of consumers subscribed to `resource`.
  pub fn subscribers(&self, resource: &ResourceId) -> usize {
    self.slots().get(resource).map_or(0, |s| s.subscribers)
  }

  /// Fetch through the coalescer without touching the cache store.
  pub(crate) fn fetch_uncommitted(
    &self,
    resource: &Resource,
    params: &QueryParams,
  ) -> Pending<Shared<T>> {
    self.start(resource, &params.signature(), params)
  }

  fn start(
    &self,
    resource: &Resource,
    signature: &Signature,
    params: &QueryParams,
  ) -> Pending<Shared<T>> {
    let key = resource.request_key(signature);
    let source = Arc::clone(&self.inner.source);
    let timeout = self.inner.options.timeout;
    let endpoint = resource.endpoint.clone();
    let params = params.clone();
    let kind = resource.kind;

    self.inner.coalescer.acquire(&key, move || {
      let operation = match kind {
        ResourceKind::Paginated => source
          .fetch_page(&endpoint, &params)
          .map_ok(|page| Arc::new(Payload::Page(page)))
          .boxed(),
        ResourceKind::Reference { .. } => source
          .fetch_collection(&endpoint)
          .map_ok(|mut items| {
            sort_by_label(&mut items);
            Arc::new(Payload::Collection(items))
          })
          .boxed(),
      };
      async move {
        match tokio::time::timeout(timeout, operation).await {
          Ok(result) => result,
          Err(_) => Err(FetchError::Timeout(timeout)),
        }
      }
    })
  }

  fn commit(
    &self,
    resource: &Resource,
    signature: Signature,
    epoch: u64,
    result: Result<Shared<T>, FetchError>,
  ) {
    let mut slots = self.slots();
    let Some(slot) = slots.get_mut(&resource.id) else {
      return;
    };

    if slot.epoch == epoch
      && slot
        .active
        .as_ref()
        .is_some_and(|a| a.signature == signature)
    {
      slot.active = None;
    }

    let is_current = slot.epoch == epoch && slot.current.as_ref() == Some(&signature);
    match result {
      Ok(payload) if is_current => {
        info!(
          resource = %resource.id,
          %signature,
          items = payload.items().len(),
          "committed"
        );
        let entry = match resource.kind {
          ResourceKind::Paginated => {
            CacheEntry::for_signature(resource.id.clone(), payload, signature)
          }
          ResourceKind::Reference { ttl } => {
            CacheEntry::with_ttl(resource.id.clone(), payload, Utc::now(), ttl)
          }
        };
        self.inner.store.put(entry);
        slot.error = None;
        slot.last_failure = None;
      }
      Ok(_) => {
        debug!(resource = %resource.id, %signature, "discarding result for abandoned query");
      }
      Err(e) if is_current => {
        warn!(resource = %resource.id, %signature, error = %e, "fetch failed");
        slot.error = Some(e.message());
        slot.last_failure = Some((signature, Instant::now()));
      }
      Err(e) => {
        debug!(
          resource = %resource.id,
          %signature,
          error = %e,
          "ignoring failure for abandoned query"
        );
      }
    }
  }
}

fn validate(resource: &Resource) -> Result<(), QueryError> {
  Resource::new(resource.id.as_str(), &resource.endpoint, resource.kind).map(|_| ())
}

/// A registered consumer. Dropping the last subscription of a reference
/// resource releases its in-memory entry; session storage keeps it.
pub struct Subscription<T: Cacheable> {
  client: QueryClient<T>,
  resource: Resource,
}

impl<T: Cacheable> Subscription<T> {
  pub fn resource(&self) -> &Resource {
    &self.resource
  }

  pub fn request_fetch(
    &self,
    params: &QueryParams,
    nav: &NavigationState,
  ) -> Result<Option<FetchHandle>, QueryError> {
    self.client.request_fetch(&self.resource, params, nav)
  }

  pub fn state(&self) -> QueryState<T> {
    self.client.state(&self.resource.id)
  }
}

impl<T: Cacheable> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.client.unsubscribe(&self.resource);
  }
}
