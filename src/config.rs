use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::accumulate::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::client::ClientOptions;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub fetch: FetchConfig,
  pub search: SearchConfig,
  pub reference: ReferenceConfig,
  pub accumulator: AccumulatorConfig,
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:3000/api".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
  /// Per-call deadline
  pub timeout_ms: u64,
  /// Quiet period after a failed fetch before the same query is retried
  pub retry_cooldown_ms: u64,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      timeout_ms: 30_000,
      retry_cooldown_ms: 5_000,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
  pub debounce_ms: u64,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self { debounce_ms: 1_000 }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReferenceConfig {
  pub ttl_secs: u64,
}

impl Default for ReferenceConfig {
  fn default() -> Self {
    Self { ttl_secs: 3_600 }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccumulatorConfig {
  pub page_size: u32,
  pub max_pages: u32,
}

impl Default for AccumulatorConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      max_pages: DEFAULT_MAX_PAGES,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
  /// Mirror reference data to session storage
  pub persist: bool,
  /// Session name; each session gets its own storage file
  pub session: String,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      persist: true,
      session: "default".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./querycache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/querycache/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("querycache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("querycache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is valid and means "all defaults"
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  pub fn client_options(&self) -> ClientOptions {
    ClientOptions {
      timeout: self.timeout(),
      retry_cooldown: Duration::from_millis(self.fetch.retry_cooldown_ms),
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.fetch.timeout_ms)
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.search.debounce_ms)
  }

  pub fn reference_ttl(&self) -> Duration {
    Duration::from_secs(self.reference.ttl_secs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_partial_file_keeps_defaults() {
    let config = Config::parse(
      "api:\n  base_url: https://example.test/api\nfetch:\n  timeout_ms: 1000\n",
    )
    .unwrap();

    assert_eq!(config.api.base_url, "https://example.test/api");
    assert_eq!(config.timeout(), Duration::from_secs(1));
    assert_eq!(config.client_options().retry_cooldown, Duration::from_secs(5));
    assert_eq!(config.debounce(), Duration::from_millis(1000));
    assert_eq!(config.reference_ttl(), Duration::from_secs(3600));
    assert_eq!(config.accumulator.page_size, 100);
    assert_eq!(config.accumulator.max_pages, 10);
    assert!(config.storage.persist);
  }

  #[test]
  fn test_empty_file_is_default() {
    assert_eq!(Config::parse("").unwrap(), Config::default());
  }

  #[test]
  fn test_explicit_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.yaml");
    std::fs::write(&path, "storage:\n  persist: false\n  session: tab-2\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert!(!config.storage.persist);
    assert_eq!(config.storage.session, "tab-2");

    assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
  }

  #[test]
  fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "fetch: [not, a, map]\n").unwrap();
    assert!(Config::load(Some(&path)).is_err());
  }
}
