//! Network boundary consumed by the fetch orchestrator.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::params::QueryParams;

/// Pagination metadata returned with every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub current_page: u32,
  pub total_pages: u32,
  pub total_count: u64,
  pub limit: u32,
  pub has_next_page: bool,
  pub has_previous_page: bool,
}

impl Pagination {
  /// Whether the server reports pages after this one.
  pub fn has_more(&self) -> bool {
    self.has_next_page && self.current_page < self.total_pages
  }
}

/// One page of a paginated list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  #[serde(default = "Vec::new")]
  pub items: Vec<T>,
  #[serde(default)]
  pub pagination: Pagination,
}

/// Where data comes from. Implementations return owned futures so an
/// operation can outlive the caller that started it.
pub trait DataSource<T>: Send + Sync {
  /// Paginated list fetch: `GET endpoint?page&limit&search&...filters`.
  fn fetch_page(&self, endpoint: &str, params: &QueryParams)
    -> BoxFuture<'static, Result<Page<T>, FetchError>>;

  /// Flat reference fetch: `GET endpoint`, no parameters.
  fn fetch_collection(&self, endpoint: &str) -> BoxFuture<'static, Result<Vec<T>, FetchError>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_page_wire_format() {
    let json = r#"{
      "items": [1, 2, 3],
      "pagination": {
        "currentPage": 1,
        "totalPages": 3,
        "totalCount": 7,
        "limit": 3,
        "hasNextPage": true,
        "hasPreviousPage": false
      }
    }"#;

    let page: Page<u32> = serde_json::from_str(json).unwrap();
    assert_eq!(page.items, vec![1, 2, 3]);
    assert_eq!(page.pagination.total_pages, 3);
    assert!(page.pagination.has_more());
  }

  #[test]
  fn test_last_page_has_no_more() {
    let p = Pagination {
      current_page: 3,
      total_pages: 3,
      total_count: 7,
      limit: 3,
      has_next_page: true,
      has_previous_page: true,
    };
    assert!(!p.has_more());
  }
}
