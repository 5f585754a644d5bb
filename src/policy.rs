//! Navigation and staleness policy: whether a fetch is needed, and whether
//! it should block the view or run silently.

use crate::cache::CacheEntry;
use crate::params::Signature;
use chrono::{DateTime, Utc};

/// Where the user is, as reported by the routing collaborator.
///
/// `seq` increases on every transition, so a view can tell a fresh arrival
/// from a re-render even when it returns to the same location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
  pub previous_location: Option<String>,
  pub current_location: String,
  pub seq: u64,
}

impl NavigationState {
  /// Initial location.
  pub fn at(location: &str) -> Self {
    Self {
      previous_location: None,
      current_location: location.to_string(),
      seq: 0,
    }
  }

  /// The state after moving to `location`.
  pub fn navigate(&self, location: &str) -> Self {
    Self {
      previous_location: Some(self.current_location.clone()),
      current_location: location.to_string(),
      seq: self.seq + 1,
    }
  }
}

/// How a fetch presents itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
  /// Show a loading indicator; nothing usable is on screen.
  Blocking,
  /// Revalidate silently while cached data stays visible.
  Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
  Skip,
  Fetch(FetchMode),
}

impl FetchDecision {
  fn fetch(has_data: bool) -> Self {
    if has_data {
      FetchDecision::Fetch(FetchMode::Background)
    } else {
      FetchDecision::Fetch(FetchMode::Blocking)
    }
  }
}

/// Decision for signature-keyed list views.
///
/// | condition                              | action                         |
/// |----------------------------------------|--------------------------------|
/// | no entry and no previous signature     | blocking fetch                 |
/// | signature changed                      | background if data, else block |
/// | same signature, just navigated in      | background if data, else block |
/// | same signature, not navigated in       | no fetch                       |
pub fn decide<T>(
  current: &Signature,
  entry: Option<&CacheEntry<T>>,
  just_navigated_in: bool,
) -> FetchDecision {
  let previous = entry.and_then(|e| e.source_signature.as_ref());
  let has_data = entry.is_some_and(|e| !e.is_empty());

  match previous {
    None => FetchDecision::fetch(has_data),
    Some(prev) if prev != current => FetchDecision::fetch(has_data),
    Some(_) if just_navigated_in => FetchDecision::fetch(has_data),
    Some(_) => FetchDecision::Skip,
  }
}

/// Decision for time-keyed reference data: a fresh, non-empty entry needs
/// nothing; an expired one revalidates in the background.
pub fn decide_ttl<T>(entry: Option<&CacheEntry<T>>, now: DateTime<Utc>) -> FetchDecision {
  match entry {
    Some(e) if !e.is_empty() && e.is_fresh(now) => FetchDecision::Skip,
    Some(e) => FetchDecision::fetch(!e.is_empty()),
    None => FetchDecision::Fetch(FetchMode::Blocking),
  }
}

/// Remembers the last navigation a view observed, so that arriving counts
/// exactly once per transition.
#[derive(Debug, Clone, Default)]
pub struct ArrivalTracker {
  last_seq: Option<u64>,
}

impl ArrivalTracker {
  /// True the first time a given transition is observed.
  pub fn observe(&mut self, nav: &NavigationState) -> bool {
    if self.last_seq == Some(nav.seq) {
      return false;
    }
    self.last_seq = Some(nav.seq);
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Payload;
  use crate::params::QueryParams;
  use crate::resource::ResourceId;
  use std::time::Duration;

  fn sig(page: u32) -> Signature {
    QueryParams::new().with("page", page).signature()
  }

  fn entry(page: u32, items: Vec<u32>) -> CacheEntry<u32> {
    CacheEntry::for_signature(
      ResourceId::new("companies").unwrap(),
      Payload::Collection(items),
      sig(page),
    )
  }

  const BLOCKING: FetchDecision = FetchDecision::Fetch(FetchMode::Blocking);
  const BACKGROUND: FetchDecision = FetchDecision::Fetch(FetchMode::Background);

  #[test]
  fn test_first_visit_blocks() {
    assert_eq!(decide::<u32>(&sig(1), None, false), BLOCKING);
    assert_eq!(decide::<u32>(&sig(1), None, true), BLOCKING);
  }

  #[test]
  fn test_changed_signature() {
    let e = entry(1, vec![1, 2]);
    assert_eq!(decide(&sig(2), Some(&e), false), BACKGROUND);

    let empty = entry(1, vec![]);
    assert_eq!(decide(&sig(2), Some(&empty), false), BLOCKING);
  }

  #[test]
  fn test_same_signature() {
    let e = entry(1, vec![1]);
    assert_eq!(decide(&sig(1), Some(&e), false), FetchDecision::Skip);
    assert_eq!(decide(&sig(1), Some(&e), true), BACKGROUND);

    let empty = entry(1, vec![]);
    assert_eq!(decide(&sig(1), Some(&empty), false), FetchDecision::Skip);
    assert_eq!(decide(&sig(1), Some(&empty), true), BLOCKING);
  }

  #[test]
  fn test_ttl_decision() {
    let now = Utc::now();
    let id = ResourceId::new("countries").unwrap();
    let ttl = Duration::from_secs(3600);

    let fresh = CacheEntry::<u32>::with_ttl(id.clone(), Payload::Collection(vec![1]), now, ttl);
    assert_eq!(decide_ttl(Some(&fresh), now), FetchDecision::Skip);

    let expired = CacheEntry::<u32>::with_ttl(
      id.clone(),
      Payload::Collection(vec![1]),
      now - chrono::Duration::hours(2),
      ttl,
    );
    assert_eq!(decide_ttl(Some(&expired), now), BACKGROUND);

    let empty = CacheEntry::<u32>::with_ttl(id, Payload::Collection(vec![]), now, ttl);
    assert_eq!(decide_ttl(Some(&empty), now), BLOCKING);
    assert_eq!(decide_ttl::<u32>(None, now), BLOCKING);
  }

  #[test]
  fn test_arrival_counts_once_per_transition() {
    let mut tracker = ArrivalTracker::default();
    let nav = NavigationState::at("/companies");

    assert!(tracker.observe(&nav));
    assert!(!tracker.observe(&nav));

    let away = nav.navigate("/contacts");
    let back = away.navigate("/companies");
    assert!(tracker.observe(&back));
    assert!(!tracker.observe(&back));

    // Same location again after another round trip
    let again = back.navigate("/contacts").navigate("/companies");
    assert_eq!(again.previous_location.as_deref(), Some("/contacts"));
    assert!(tracker.observe(&again));
  }
}
