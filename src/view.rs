//! A paginated list view as a consumer of the query client.
//!
//! Holds the view's filters, debounces free-text search, and re-evaluates the
//! fetch policy on every tick. Typing, paging and filter changes only edit
//! local state; `tick` turns the settled state into (at most) one fetch.

use std::time::Duration;

use tracing::debug;

use crate::cache::Cacheable;
use crate::client::{FetchHandle, QueryClient, Subscription};
use crate::debounce::Debounced;
use crate::error::QueryError;
use crate::params::{ListFilters, DEFAULT_PAGE};
use crate::policy::NavigationState;
use crate::query::QueryState;
use crate::resource::Resource;

pub struct ListView<T: Cacheable> {
  client: QueryClient<T>,
  subscription: Subscription<T>,
  filters: ListFilters,
  search: Debounced<String>,
  nav: NavigationState,
}

impl<T: Cacheable> ListView<T> {
  pub fn new(
    client: QueryClient<T>,
    resource: Resource,
    filters: ListFilters,
    nav: NavigationState,
    debounce: Duration,
  ) -> Self {
    let subscription = client.subscribe(&resource);
    let search = filters.search.clone().unwrap_or_default();
    Self {
      client,
      subscription,
      filters,
      search: Debounced::new(search, debounce),
      nav,
    }
  }

  pub fn resource(&self) -> &Resource {
    self.subscription.resource()
  }

  pub fn filters(&self) -> &ListFilters {
    &self.filters
  }

  /// Search text as typed, possibly not yet settled.
  pub fn search_input(&self) -> &str {
    self.search.raw()
  }

  pub fn is_search_pending(&self) -> bool {
    self.search.is_pending()
  }

  pub fn navigation(&self) -> &NavigationState {
    &self.nav
  }

  /// Record a navigation reported by the router.
  pub fn navigate(&mut self, nav: NavigationState) {
    self.nav = nav;
  }

  /// Feed a keystroke's worth of search text.
  pub fn set_search(&mut self, text: &str) {
    self.search.set(text.to_string());
  }

  /// Returns false if already on `page`.
  pub fn set_page(&mut self, page: u32) -> bool {
    if self.filters.page == Some(page) {
      return false;
    }
    self.filters.page = Some(page);
    true
  }

  /// A new page size starts over from the first page.
  pub fn set_limit(&mut self, limit: u32) {
    self.filters.limit = Some(limit);
    self.filters.page = Some(DEFAULT_PAGE);
  }

  /// Replace the non-pagination filters and go back to the first page.
  pub fn apply_filters(&mut self, filters: ListFilters) {
    let limit = self.filters.limit;
    let search = self.filters.search.take();
    self.filters = ListFilters {
      page: Some(DEFAULT_PAGE),
      limit,
      search,
      ..filters
    };
  }

  /// Reset everything to defaults and drop the cached result, so the next
  /// tick fetches from scratch.
  pub fn clear_filters(&mut self) {
    self.filters = ListFilters::default();
    self.search.reset(String::new());
    self.client.invalidate(&self.resource().id);
  }

  /// Apply a settled search, then evaluate the fetch policy.
  pub fn tick(&mut self) -> Result<Option<FetchHandle>, QueryError> {
    if let Some(term) = self.search.poll() {
      debug!(resource = %self.resource().id, term = %term, "search settled");
      let term = term.trim().to_string();
      self.filters.search = (!term.is_empty()).then_some(term);
      self.filters.page = Some(DEFAULT_PAGE);
    }
    self
      .subscription
      .request_fetch(&self.filters.to_params(), &self.nav)
  }

  pub fn state(&self) -> QueryState<T> {
    self.subscription.state()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::ClientOptions;
  use crate::policy::FetchMode;
  use crate::query::LoadStatus;
  use crate::testing::{int_param, page_of, text_param, Item, MockSource, Reply};
  use std::sync::Arc;

  fn view(source: &Arc<MockSource>) -> ListView<Item> {
    let client = QueryClient::new(source.clone(), ClientOptions::default());
    ListView::new(
      client,
      Resource::paginated("companies:table", "/admin/companies").unwrap(),
      ListFilters::default(),
      NavigationState::at("/companies"),
      Duration::from_millis(1000),
    )
  }

  fn source() -> Arc<MockSource> {
    Arc::new(MockSource::pages(|params| {
      let page = int_param(params, "page").unwrap_or(1) as u32;
      let limit = int_param(params, "limit").unwrap_or(25) as u32;
      Reply::ok(page_of(limit as usize, page, 10, limit))
    }))
  }

  async fn settle(view: &mut ListView<Item>) {
    if let Some(handle) = view.tick().unwrap() {
      handle.join().await;
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_fast_typing_fetches_once_with_final_text() {
    let source = source();
    let mut view = view(&source);
    settle(&mut view).await;
    assert_eq!(source.calls(), 1);

    view.set_page(3);
    settle(&mut view).await;
    assert_eq!(source.calls(), 2);

    for text in ["a", "ab", "abc"] {
      view.set_search(text);
      tokio::time::sleep(Duration::from_millis(300)).await;
      assert!(view.tick().unwrap().is_none());
    }
    assert!(view.is_search_pending());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let handle = view.tick().unwrap().unwrap();
    handle.join().await;

    assert_eq!(source.calls(), 3);
    let last = source.requests().pop().unwrap();
    assert_eq!(text_param(&last, "search").as_deref(), Some("abc"));
    assert_eq!(int_param(&last, "page"), Some(1));
    assert_eq!(view.filters().page, Some(1));
  }

  #[tokio::test]
  async fn test_same_page_is_ignored() {
    let source = source();
    let mut view = view(&source);
    settle(&mut view).await;

    assert!(!view.set_page(1));
    assert!(view.tick().unwrap().is_none());
    assert_eq!(source.calls(), 1);
  }

  #[tokio::test]
  async fn test_limit_and_filters_reset_page() {
    let source = source();
    let mut view = view(&source);
    view.set_page(4);
    view.set_limit(50);
    assert_eq!(view.filters().page, Some(1));
    assert_eq!(view.filters().limit, Some(50));

    view.set_page(2);
    let mut filters = ListFilters::default();
    filters.industry = Some("Software".into());
    view.apply_filters(filters);
    assert_eq!(view.filters().page, Some(1));
    assert_eq!(view.filters().limit, Some(50));
    assert_eq!(view.filters().industry.as_deref(), Some("Software"));

    settle(&mut view).await;
    let last = source.requests().pop().unwrap();
    assert_eq!(text_param(&last, "industry").as_deref(), Some("Software"));
    assert_eq!(view.state().items().len(), 50);
  }

  #[tokio::test]
  async fn test_clear_filters_forces_blocking_fetch() {
    let source = source();
    let mut view = view(&source);
    settle(&mut view).await;

    view.clear_filters();
    assert!(view.filters().has_only_defaults());
    assert_eq!(view.state().status, LoadStatus::Idle);
    assert!(view.state().data.is_none());

    let handle = view.tick().unwrap().unwrap();
    assert_eq!(handle.mode(), FetchMode::Blocking);
    handle.join().await;
    assert_eq!(source.calls(), 2);
  }

  #[tokio::test]
  async fn test_returning_to_view_revalidates() {
    let source = source();
    let mut view = view(&source);
    settle(&mut view).await;

    let away = view.navigation().navigate("/contacts");
    view.navigate(away.navigate("/companies"));
    let handle = view.tick().unwrap().unwrap();
    assert_eq!(handle.mode(), FetchMode::Background);
    assert_eq!(view.state().status, LoadStatus::Revalidating);
    handle.join().await;
  }
}
