use crate::commands::{self, Input, COMMANDS};
use crate::event::{Event, EventHandler};
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use querycache::accumulate::{Accumulator, DEFAULT_FILTER_LIMIT};
use querycache::cache::{NoopStorage, Payload, SessionStorage, SqliteStorage};
use querycache::client::QueryClient;
use querycache::config::Config;
use querycache::http::HttpSource;
use querycache::params::ListFilters;
use querycache::policy::NavigationState;
use querycache::query::{LoadStatus, QueryState};
use querycache::resource::Resource;
use querycache::types::{Company, CompanyName, Country};
use querycache::view::ListView;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const COMPANIES_ENDPOINT: &str = "/admin/companies";
const COUNTRIES_ENDPOINT: &str = "/common/countries";
const COMPANIES_ROUTE: &str = "/companies";

/// What was last printed in browse mode
#[derive(Default)]
struct Shown {
  status: LoadStatus,
  data: Option<Arc<Payload<Company>>>,
  error: Option<String>,
}

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Backend API
  source: Arc<HttpSource>,

  /// Session storage for reference data
  storage: Arc<dyn SessionStorage>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let source = Arc::new(HttpSource::from_env(&config.api.base_url, config.timeout())?);

    let storage: Arc<dyn SessionStorage> = if config.storage.persist {
      let storage = SqliteStorage::open(&config.storage.session)?;
      let cutoff = Utc::now() - chrono::Duration::seconds(config.reference.ttl_secs as i64);
      let purged = storage.purge_before(cutoff.timestamp_millis())?;
      if purged > 0 {
        info!(purged, "removed expired session records");
      }
      Arc::new(storage)
    } else {
      Arc::new(NoopStorage)
    };

    Ok(Self {
      config,
      source,
      storage,
    })
  }

  fn companies(&self) -> Result<(QueryClient<Company>, Resource)> {
    let client = QueryClient::new(self.source.clone(), self.config.client_options());
    let resource = Resource::paginated("companies:table", COMPANIES_ENDPOINT)?;
    Ok((client, resource))
  }

  /// Fetch and print one page of companies.
  pub async fn list(&self, filters: ListFilters) -> Result<()> {
    let (client, resource) = self.companies()?;
    let nav = NavigationState::at(COMPANIES_ROUTE);

    if let Some(handle) = client.request_fetch(&resource, &filters.to_params(), &nav)? {
      handle.join().await;
    }

    let state = client.state(&resource.id);
    if let Some(e) = state.error() {
      return Err(eyre!("Failed to fetch companies: {}", e));
    }
    print_page(&state);
    Ok(())
  }

  /// Print the country reference list, served from session storage when fresh.
  pub async fn countries(&self) -> Result<()> {
    let client: QueryClient<Country> = QueryClient::with_storage(
      self.source.clone(),
      self.storage.clone(),
      self.config.client_options(),
    );
    let resource =
      Resource::reference("countries", COUNTRIES_ENDPOINT, self.config.reference_ttl())?;
    client.hydrate(std::slice::from_ref(&resource));

    let consumer = client.subscribe(&resource);
    let nav = NavigationState::at("/");
    match consumer.request_fetch(&Default::default(), &nav)? {
      Some(handle) => handle.join().await,
      None => println!("(from session storage)"),
    }

    let state = consumer.state();
    if let Some(e) = state.error() {
      return Err(eyre!("Failed to fetch countries: {}", e));
    }
    for country in state.items() {
      println!("{:<4} {}", country.code.as_deref().unwrap_or("-"), country.name);
    }
    Ok(())
  }

  /// Accumulate every company name and print the ones matching `term`.
  pub async fn corpus(&self, term: Option<&str>) -> Result<()> {
    let client: QueryClient<CompanyName> =
      QueryClient::new(self.source.clone(), self.config.client_options());
    let resource = Resource::paginated("companies:names", COMPANIES_ENDPOINT)?;
    let mut accumulator = Accumulator::new(
      client,
      resource,
      self.config.accumulator.page_size,
      self.config.accumulator.max_pages,
    )?;

    let total = accumulator
      .open()
      .await
      .map_err(|e| eyre!("Failed to fetch company names: {}", e))?
      .len();

    let hits = accumulator.filter(term.unwrap_or(""), DEFAULT_FILTER_LIMIT);
    for name in &hits {
      println!("{}", name.company_name);
    }
    println!("({} of {} names)", hits.len(), total);
    Ok(())
  }

  /// Interactive list: search text and commands from stdin, status changes
  /// printed as they happen.
  pub async fn browse(&self, filters: ListFilters) -> Result<()> {
    let (client, resource) = self.companies()?;
    let mut view = ListView::new(
      client,
      resource,
      filters,
      NavigationState::at(COMPANIES_ROUTE),
      self.config.debounce(),
    );

    println!("Type to search, :help for commands.");

    let mut events = EventHandler::new(Duration::from_millis(100));
    let mut shown = Shown::default();
    let mut closing = false;

    while let Some(event) = events.next().await {
      match event {
        Event::Tick => {
          // The fetch runs on its own task; status is picked up on later ticks
          view.tick()?;
          let state = view.state();
          report(&state, &mut shown);
          if closing && !view.is_search_pending() && !state.status.is_busy() {
            break;
          }
        }
        Event::Line(line) => {
          if handle_input(&mut view, &line) {
            break;
          }
        }
        Event::Eof => closing = true,
      }
    }

    Ok(())
  }
}

/// Apply one line of input to the view. Returns true to quit.
fn handle_input(view: &mut ListView<Company>, line: &str) -> bool {
  match commands::parse(line) {
    Ok(Input::Search(text)) => view.set_search(&text),
    Ok(Input::Page(page)) => {
      if !view.set_page(page) {
        println!("Already on page {}", page);
      }
    }
    Ok(Input::Limit(limit)) => view.set_limit(limit),
    Ok(Input::Filter { name, value }) => {
      let mut filters = view.filters().clone();
      if filters.set_field(&name, value) {
        view.apply_filters(filters);
      } else {
        println!("Unknown filter: {}", name);
      }
    }
    Ok(Input::Clear) => view.clear_filters(),
    Ok(Input::Back) => {
      let away = view.navigation().navigate("/dashboard");
      view.navigate(away.navigate(COMPANIES_ROUTE));
    }
    Ok(Input::Help) => {
      for cmd in COMMANDS {
        println!("  {:<22} {}", cmd.usage, cmd.description);
      }
    }
    Ok(Input::Quit) => return true,
    Err(msg) => println!("{}", msg),
  }
  false
}

/// Print whatever changed since the last report.
fn report(state: &QueryState<Company>, shown: &mut Shown) {
  if state.status != shown.status {
    match state.status {
      LoadStatus::Loading => println!("[loading]"),
      LoadStatus::Revalidating => println!(
        "[revalidating] showing {} cached rows",
        state.items().len()
      ),
      LoadStatus::Idle => {}
    }
    shown.status = state.status;
  }

  let new_data = match (&state.data, &shown.data) {
    (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
    (a, b) => a.is_some() != b.is_some(),
  };
  if new_data {
    print_page(state);
    shown.data = state.data.clone();
  }

  if state.error != shown.error {
    if let Some(e) = state.error() {
      println!("[error] {}", e);
    }
    shown.error = state.error.clone();
  }
}

fn print_page(state: &QueryState<Company>) {
  for company in state.items() {
    println!(
      "{:<40} {:<24} {}",
      company.company_name,
      company.industry.as_deref().unwrap_or("-"),
      company.country.as_deref().unwrap_or("-"),
    );
  }
  if let Some(p) = state.pagination() {
    println!(
      "-- page {}/{} ({} companies) --",
      p.current_page, p.total_pages, p.total_count
    );
  }
}
