//! Core traits for cached items.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for items that can be cached and persisted.
///
/// Implementors provide a unique key (for de-duplication) and a display label
/// (for sorting and local filtering).
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this item (e.g., a database id)
  fn cache_key(&self) -> String;

  /// Human-readable label, used to sort reference lists and filter corpora
  fn label(&self) -> &str;

  /// Item type name for storage organization (e.g., "company", "country")
  fn entity_type() -> &'static str;
}

/// Sort items by label, case-insensitively, keeping the original order for
/// ties.
pub fn sort_by_label<T: Cacheable>(items: &mut [T]) {
  items.sort_by_cached_key(|item| item.label().to_lowercase());
}
