//! UI-facing query state.
//!
//! Consumers read a `QueryState` snapshot: a status, the cached payload (which
//! stays visible across revalidations and failures), and any error message.
//! They never infer loading state from timestamps.

use std::sync::Arc;

use crate::cache::Payload;
use crate::policy::FetchMode;
use crate::source::Pagination;

/// The state of a resource's network activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
  /// No fetch in flight
  #[default]
  Idle,
  /// Blocking fetch in flight, nothing usable to show
  Loading,
  /// Background fetch in flight, cached data stays visible
  Revalidating,
}

impl LoadStatus {
  /// Derive the status from the active fetch, if any, and whether cached data
  /// is on screen.
  pub fn derive(active: Option<FetchMode>, has_data: bool) -> Self {
    match active {
      None => LoadStatus::Idle,
      Some(FetchMode::Background) if has_data => LoadStatus::Revalidating,
      Some(_) => LoadStatus::Loading,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, LoadStatus::Loading)
  }

  pub fn is_busy(&self) -> bool {
    !matches!(self, LoadStatus::Idle)
  }

  pub fn label(&self) -> &'static str {
    match self {
      LoadStatus::Idle => "idle",
      LoadStatus::Loading => "loading",
      LoadStatus::Revalidating => "revalidating",
    }
  }
}

/// Snapshot of a resource as seen by consumers.
#[derive(Debug)]
pub struct QueryState<T> {
  pub status: LoadStatus,
  pub data: Option<Arc<Payload<T>>>,
  pub error: Option<String>,
}

impl<T> Clone for QueryState<T> {
  fn clone(&self) -> Self {
    Self {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
    }
  }
}

impl<T> Default for QueryState<T> {
  fn default() -> Self {
    Self {
      status: LoadStatus::Idle,
      data: None,
      error: None,
    }
  }
}

impl<T> QueryState<T> {
  pub fn items(&self) -> &[T] {
    self.data.as_deref().map(Payload::items).unwrap_or(&[])
  }

  pub fn pagination(&self) -> Option<&Pagination> {
    self.data.as_deref().and_then(Payload::pagination)
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn has_data(&self) -> bool {
    !self.items().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_derive_status() {
    assert_eq!(LoadStatus::derive(None, false), LoadStatus::Idle);
    assert_eq!(LoadStatus::derive(None, true), LoadStatus::Idle);
    assert_eq!(
      LoadStatus::derive(Some(FetchMode::Blocking), false),
      LoadStatus::Loading
    );
    assert_eq!(
      LoadStatus::derive(Some(FetchMode::Background), true),
      LoadStatus::Revalidating
    );
    // Background without anything to show still blocks the view
    assert_eq!(
      LoadStatus::derive(Some(FetchMode::Background), false),
      LoadStatus::Loading
    );
  }

  #[test]
  fn test_empty_state() {
    let state: QueryState<u32> = QueryState::default();
    assert!(state.items().is_empty());
    assert!(state.pagination().is_none());
    assert!(!state.status.is_busy());
  }
}
