//! Scripted data source for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;
use crate::error::FetchError;
use crate::params::{ParamValue, QueryParams};
use crate::source::{DataSource, Page, Pagination};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
  pub id: String,
  pub name: String,
}

impl Item {
  pub fn new(name: &str) -> Self {
    Self {
      id: name.to_lowercase(),
      name: name.to_string(),
    }
  }
}

impl Cacheable for Item {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn label(&self) -> &str {
    &self.name
  }

  fn entity_type() -> &'static str {
    "item"
  }
}

/// What the source answers to one request.
#[derive(Debug, Clone)]
pub struct Reply<R> {
  pub delay: Duration,
  pub result: Result<R, FetchError>,
}

impl<R> Reply<R> {
  pub fn ok(value: R) -> Self {
    Self {
      delay: Duration::from_millis(10),
      result: Ok(value),
    }
  }

  pub fn err(error: FetchError) -> Self {
    Self {
      delay: Duration::from_millis(10),
      result: Err(error),
    }
  }

  pub fn after(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

type PageScript = Box<dyn Fn(&QueryParams) -> Reply<Page<Item>> + Send + Sync>;
type CollectionScript = Box<dyn Fn() -> Reply<Vec<Item>> + Send + Sync>;

/// Data source that answers from closures and records every call.
pub struct MockSource {
  calls: AtomicUsize,
  requests: Mutex<Vec<QueryParams>>,
  pages: PageScript,
  collection: CollectionScript,
}

impl MockSource {
  pub fn pages(script: impl Fn(&QueryParams) -> Reply<Page<Item>> + Send + Sync + 'static) -> Self {
    Self {
      calls: AtomicUsize::new(0),
      requests: Mutex::new(Vec::new()),
      pages: Box::new(script),
      collection: Box::new(|| Reply::ok(Vec::new())),
    }
  }

  pub fn collection(script: impl Fn() -> Reply<Vec<Item>> + Send + Sync + 'static) -> Self {
    Self {
      calls: AtomicUsize::new(0),
      requests: Mutex::new(Vec::new()),
      pages: Box::new(|_| Reply::ok(page_of(0, 1, 1, 25))),
      collection: Box::new(script),
    }
  }

  /// Number of network calls issued.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Parameters of every page request, in order.
  pub fn requests(&self) -> Vec<QueryParams> {
    self.requests.lock().unwrap().clone()
  }
}

impl DataSource<Item> for MockSource {
  fn fetch_page(
    &self,
    _endpoint: &str,
    params: &QueryParams,
  ) -> BoxFuture<'static, Result<Page<Item>, FetchError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(params.clone());
    let reply = (self.pages)(params);
    async move {
      tokio::time::sleep(reply.delay).await;
      reply.result
    }
    .boxed()
  }

  fn fetch_collection(&self, _endpoint: &str) -> BoxFuture<'static, Result<Vec<Item>, FetchError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let reply = (self.collection)();
    async move {
      tokio::time::sleep(reply.delay).await;
      reply.result
    }
    .boxed()
  }
}

/// A page of `count` items labelled `p{page}-{i}`.
pub fn page_of(count: usize, page: u32, total_pages: u32, limit: u32) -> Page<Item> {
  Page {
    items: (0..count)
      .map(|i| Item::new(&format!("p{}-{}", page, i)))
      .collect(),
    pagination: Pagination {
      current_page: page,
      total_pages,
      total_count: u64::from(total_pages) * u64::from(limit),
      limit,
      has_next_page: page < total_pages,
      has_previous_page: page > 1,
    },
  }
}

/// Integer parameter value, for scripts.
pub fn int_param(params: &QueryParams, key: &str) -> Option<i64> {
  match params.get(key)? {
    ParamValue::Int(n) => Some(*n),
    ParamValue::Text(_) => None,
  }
}

/// Text parameter value, for scripts.
pub fn text_param(params: &QueryParams, key: &str) -> Option<String> {
  match params.get(key)? {
    ParamValue::Text(s) => Some(s.clone()),
    ParamValue::Int(_) => None,
  }
}

pub fn server_error(message: &str) -> FetchError {
  FetchError::Server {
    status: 500,
    message: message.to_string(),
  }
}
