mod app;
mod commands;
mod event;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use querycache::config::Config;
use querycache::params::{ListFilters, DEFAULT_LIMIT, DEFAULT_PAGE};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "querycache")]
#[command(about = "Cached, coalesced queries against the company directory API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/querycache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Print one page of companies
  List(FilterArgs),
  /// Print the country reference list
  Countries,
  /// Accumulate all company names and filter them locally
  Corpus {
    /// Case-insensitive substring to match
    term: Option<String>,
  },
  /// Interactive list driven by stdin
  Browse(FilterArgs),
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
  #[arg(long, default_value_t = DEFAULT_PAGE)]
  page: u32,

  #[arg(long, default_value_t = DEFAULT_LIMIT)]
  limit: u32,

  #[arg(short, long)]
  search: Option<String>,

  /// Filter as name=value, e.g. industry=Software (repeatable)
  #[arg(short, long = "filter")]
  filters: Vec<String>,
}

impl FilterArgs {
  fn into_filters(self) -> Result<ListFilters> {
    let mut filters = ListFilters::new(self.page, self.limit);
    filters.search = self.search.filter(|s| !s.trim().is_empty());
    for pair in &self.filters {
      let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| eyre!("Invalid filter {:?}, expected name=value", pair))?;
      let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
      if !filters.set_field(name.trim(), value) {
        return Err(eyre!("Unknown filter: {}", name));
      }
    }
    Ok(filters)
  }
}

/// Log to a daily file under the data directory so output never mixes with
/// stdout.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("querycache")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "querycache.log"));

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("QUERYCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let app = app::App::new(config)?;
  match args.command {
    Cmd::List(filters) => app.list(filters.into_filters()?).await,
    Cmd::Countries => app.countries().await,
    Cmd::Corpus { term } => app.corpus(term.as_deref()).await,
    Cmd::Browse(filters) => app.browse(filters.into_filters()?).await,
  }
}
