//! Full-corpus accumulation for local filtering.
//!
//! Walks a paginated resource page by page until the server says there is
//! nothing more (or a page ceiling is hit), keeps the de-duplicated, sorted
//! result, and serves later opens from memory.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::cache::{sort_by_label, Cacheable};
use crate::client::QueryClient;
use crate::error::{FetchError, QueryError};
use crate::params::QueryParams;
use crate::resource::{Resource, ResourceKind};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const DEFAULT_FILTER_LIMIT: usize = 50;

pub struct Accumulator<T: Cacheable> {
  client: QueryClient<T>,
  resource: Resource,
  page_size: u32,
  max_pages: u32,
  corpus: Vec<T>,
  materialized: bool,
}

impl<T: Cacheable> Accumulator<T> {
  /// Accumulator over a paginated resource. Reference resources are rejected.
  pub fn new(
    client: QueryClient<T>,
    resource: Resource,
    page_size: u32,
    max_pages: u32,
  ) -> Result<Self, QueryError> {
    if resource.kind != ResourceKind::Paginated {
      return Err(QueryError::KindMismatch {
        id: resource.id.to_string(),
        expected: ResourceKind::Paginated.name(),
        actual: resource.kind.name(),
      });
    }
    Ok(Self {
      client,
      resource,
      page_size: page_size.max(1),
      max_pages: max_pages.max(1),
      corpus: Vec::new(),
      materialized: false,
    })
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }

  pub fn is_materialized(&self) -> bool {
    self.materialized
  }

  pub fn corpus(&self) -> &[T] {
    &self.corpus
  }

  /// Materialize the corpus on first use; later calls issue no requests.
  ///
  /// On failure the partial corpus is dropped so the next open starts over.
  pub async fn open(&mut self) -> Result<&[T], FetchError> {
    if self.materialized {
      debug!(resource = %self.resource.id, "corpus already materialized");
      return Ok(&self.corpus);
    }

    match self.collect().await {
      Ok(mut items) => {
        sort_by_label(&mut items);
        info!(resource = %self.resource.id, items = items.len(), "corpus materialized");
        self.corpus = items;
        self.materialized = true;
        Ok(&self.corpus)
      }
      Err(e) => {
        warn!(resource = %self.resource.id, error = %e, "corpus accumulation failed");
        self.corpus.clear();
        Err(e)
      }
    }
  }

  async fn collect(&self) -> Result<Vec<T>, FetchError> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for page in 1..=self.max_pages {
      let params = QueryParams::new()
        .with("page", page)
        .with("limit", self.page_size);
      let payload = self.client.fetch_uncommitted(&self.resource, &params).await?;

      let fetched = payload.items();
      if fetched.is_empty() {
        debug!(resource = %self.resource.id, page, "empty page, stopping");
        break;
      }
      for item in fetched {
        if seen.insert(item.cache_key()) {
          items.push(item.clone());
        }
      }

      let more = payload.pagination().is_some_and(|p| p.has_more());
      debug!(resource = %self.resource.id, page, total = items.len(), more, "page accumulated");
      if !more {
        break;
      }
      if page == self.max_pages {
        warn!(resource = %self.resource.id, max_pages = self.max_pages, "page ceiling reached");
      }
    }

    Ok(items)
  }

  /// Items whose label contains `term`, case-insensitively, at most `limit`.
  /// A blank term returns the first `limit` items.
  pub fn filter(&self, term: &str, limit: usize) -> Vec<&T> {
    let needle = term.trim().to_lowercase();
    self
      .corpus
      .iter()
      .filter(|item| needle.is_empty() || item.label().to_lowercase().contains(&needle))
      .take(limit)
      .collect()
  }
}
