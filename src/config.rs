use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_MEMORY_CAPACITY;
use crate::dispatch::DEFAULT_QUEUE_CAPACITY;
use crate::request::Endpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Host (and optional port) of the API, e.g. "api.example.com"
  pub authority: String,
  #[serde(default = "default_scheme")]
  pub scheme: String,
}

fn default_scheme() -> String {
  "https".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// One file per cached resource
  #[default]
  Files,
  /// Single SQLite database
  Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to always go to the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Number of entries kept in memory
  #[serde(default = "default_memory_capacity")]
  pub memory_capacity: usize,
  #[serde(default)]
  pub backend: CacheBackend,
  /// Durable tier location (defaults to the data directory)
  pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      memory_capacity: DEFAULT_MEMORY_CAPACITY,
      backend: CacheBackend::default(),
      directory: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_memory_capacity() -> usize {
  DEFAULT_MEMORY_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
  /// Requests allowed to wait for the worker
  #[serde(default = "default_queue_capacity")]
  pub capacity: usize,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_QUEUE_CAPACITY,
    }
  }
}

fn default_queue_capacity() -> usize {
  DEFAULT_QUEUE_CAPACITY
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./restcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/restcache/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/restcache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("restcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("restcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse configuration from YAML text.
  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.api.authority.trim().is_empty() {
      return Err(eyre!("api.authority must not be empty"));
    }

    Ok(config)
  }

  pub fn endpoint(&self) -> Endpoint {
    Endpoint::new(self.api.scheme.clone(), self.api.authority.clone())
  }

  /// Directory of the durable cache tier.
  pub fn cache_directory(&self) -> Result<PathBuf> {
    match &self.cache.directory {
      Some(dir) => Ok(dir.clone()),
      None => Ok(data_dir()?.join(sanitize(&self.api.authority))),
    }
  }

  /// Get the API access token from the environment, if any.
  ///
  /// Checks RESTCACHE_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("RESTCACHE_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

/// Base data directory for cache and logs.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("restcache"))
}

/// Make an authority usable as a directory name.
fn sanitize(authority: &str) -> String {
  authority
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
    .collect()
}
