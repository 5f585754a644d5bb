//! In-memory cache store with two freshness policies.
//!
//! List views use signature-keyed entries: an entry answers only the query it
//! was fetched for, but stays visible while a different query revalidates.
//! Reference data uses time-keyed entries that are valid until their TTL runs
//! out and are mirrored to session storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::storage::{SessionStorage, StoredRecord};
use super::traits::Cacheable;
use crate::params::Signature;
use crate::resource::ResourceId;
use crate::source::{Page, Pagination};

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
  /// A page of a paginated list.
  Page(Page<T>),
  /// A flat reference collection.
  Collection(Vec<T>),
}

impl<T> Payload<T> {
  pub fn items(&self) -> &[T] {
    match self {
      Payload::Page(page) => &page.items,
      Payload::Collection(items) => items,
    }
  }

  pub fn pagination(&self) -> Option<&Pagination> {
    match self {
      Payload::Page(page) => Some(&page.pagination),
      Payload::Collection(_) => None,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items().is_empty()
  }
}

/// A committed result. Immutable; replaced wholesale.
#[derive(Debug)]
pub struct CacheEntry<T> {
  pub resource: ResourceId,
  pub payload: Arc<Payload<T>>,
  /// Signature the payload was fetched with (signature-keyed entries)
  pub source_signature: Option<Signature>,
  pub fetched_at: DateTime<Utc>,
  /// Lifetime of time-keyed entries
  pub ttl: Option<Duration>,
}

impl<T> Clone for CacheEntry<T> {
  fn clone(&self) -> Self {
    Self {
      resource: self.resource.clone(),
      payload: Arc::clone(&self.payload),
      source_signature: self.source_signature.clone(),
      fetched_at: self.fetched_at,
      ttl: self.ttl,
    }
  }
}

impl<T> CacheEntry<T> {
  /// Entry for a list view, valid for `signature` only.
  pub fn for_signature(
    resource: ResourceId,
    payload: impl Into<Arc<Payload<T>>>,
    signature: Signature,
  ) -> Self {
    Self {
      resource,
      payload: payload.into(),
      source_signature: Some(signature),
      fetched_at: Utc::now(),
      ttl: None,
    }
  }

  /// Entry for reference data, valid for `ttl` after `fetched_at`.
  pub fn with_ttl(
    resource: ResourceId,
    payload: impl Into<Arc<Payload<T>>>,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
  ) -> Self {
    Self {
      resource,
      payload: payload.into(),
      source_signature: None,
      fetched_at,
      ttl: Some(ttl),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.payload.is_empty()
  }

  /// Whether this entry answers the query with `signature`.
  pub fn matches(&self, signature: &Signature) -> bool {
    self.source_signature.as_ref() == Some(signature)
  }

  /// Whether a time-keyed entry is still within its TTL. Entries without a
  /// TTL never expire by age.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    match self.ttl {
      None => true,
      Some(ttl) => age(self.fetched_at, now) < ttl,
    }
  }
}

fn age(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
  now
    .signed_duration_since(fetched_at)
    .to_std()
    .unwrap_or(Duration::MAX)
}

/// On-disk layout of a persisted reference collection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecord<T> {
  items: Vec<T>,
  /// Epoch milliseconds
  fetched_at: i64,
}

/// Holds the most recent successful result per resource.
pub struct CacheStore<T> {
  entries: Mutex<HashMap<ResourceId, CacheEntry<T>>>,
  storage: Option<Arc<dyn SessionStorage>>,
}

impl<T: Cacheable> Default for CacheStore<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Cacheable> CacheStore<T> {
  /// Memory-only store.
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      storage: None,
    }
  }

  /// Store that mirrors time-keyed entries to `storage`.
  pub fn with_storage(storage: Arc<dyn SessionStorage>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      storage: Some(storage),
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<ResourceId, CacheEntry<T>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, resource: &ResourceId) -> Option<CacheEntry<T>> {
    self.entries().get(resource).cloned()
  }

  /// Signature-keyed lookup: the entry only if it was fetched for `signature`.
  pub fn valid_for(&self, resource: &ResourceId, signature: &Signature) -> Option<CacheEntry<T>> {
    self.get(resource).filter(|e| e.matches(signature))
  }

  /// Time-keyed lookup: the entry only if its TTL has not run out.
  pub fn fresh(&self, resource: &ResourceId, now: DateTime<Utc>) -> Option<CacheEntry<T>> {
    self.get(resource).filter(|e| e.is_fresh(now))
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub(crate) fn put(&self, entry: CacheEntry<T>) {
    if entry.ttl.is_some() {
      self.persist(&entry);
    }
    self.entries().insert(entry.resource.clone(), entry);
  }

  /// Drop the entry from memory and from session storage.
  pub(crate) fn invalidate(&self, resource: &ResourceId) -> Option<CacheEntry<T>> {
    if let Some(storage) = &self.storage {
      if let Err(e) = storage.remove(&storage_key::<T>(resource)) {
        warn!(%resource, error = %e, "failed to remove persisted entry");
      }
    }
    self.entries().remove(resource)
  }

  /// Drop the entry from memory only; a persisted copy stays available for
  /// hydration.
  pub(crate) fn evict(&self, resource: &ResourceId) -> Option<CacheEntry<T>> {
    self.entries().remove(resource)
  }

  /// Load a persisted time-keyed entry into memory.
  ///
  /// Records whose TTL has elapsed, and records that fail to decode, are
  /// removed from storage instead. Returns whether an entry was loaded.
  pub(crate) fn hydrate(&self, resource: &ResourceId, ttl: Duration) -> bool {
    let Some(storage) = &self.storage else {
      return false;
    };
    let key = storage_key::<T>(resource);

    let stored = match storage.read(&key) {
      Ok(Some(stored)) => stored,
      Ok(None) => return false,
      Err(e) => {
        warn!(%resource, error = %e, "failed to read persisted entry");
        return false;
      }
    };

    let decoded = serde_json::from_slice::<PersistedRecord<T>>(&stored.data)
      .ok()
      .and_then(|record| {
        let fetched_at = Utc.timestamp_millis_opt(record.fetched_at).single()?;
        Some(CacheEntry::with_ttl(
          resource.clone(),
          Payload::Collection(record.items),
          fetched_at,
          ttl,
        ))
      });

    match decoded {
      Some(entry) if entry.is_fresh(Utc::now()) => {
        info!(%resource, items = entry.payload.items().len(), "hydrated from session storage");
        self.entries().insert(resource.clone(), entry);
        true
      }
      Some(_) => {
        debug!(%resource, "discarding expired persisted entry");
        self.remove_persisted(&key);
        false
      }
      None => {
        warn!(%resource, "discarding unreadable persisted entry");
        self.remove_persisted(&key);
        false
      }
    }
  }

  fn persist(&self, entry: &CacheEntry<T>) {
    let Some(storage) = &self.storage else {
      return;
    };

    let record = PersistedRecord {
      items: entry.payload.items().to_vec(),
      fetched_at: entry.fetched_at.timestamp_millis(),
    };
    let result = serde_json::to_vec(&record)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize entry: {}", e))
      .and_then(|data| {
        storage.write(
          &storage_key::<T>(&entry.resource),
          &StoredRecord {
            data,
            fetched_at: record.fetched_at,
          },
        )
      });

    if let Err(e) = result {
      warn!(resource = %entry.resource, error = %e, "failed to persist entry");
    }
  }

  fn remove_persisted(&self, key: &str) {
    if let Some(storage) = &self.storage {
      if let Err(e) = storage.remove(key) {
        warn!(key, error = %e, "failed to remove persisted entry");
      }
    }
  }
}

fn storage_key<T: Cacheable>(resource: &ResourceId) -> String {
  format!("{}:{}", T::entity_type(), resource)
}
