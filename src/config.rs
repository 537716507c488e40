use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::worker::DEFAULT_MANIFEST;

/// Application name used for config and data directory paths
const APP_NAME: &str = "reviewcache";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  /// Origin serving the static page assets the worker caches
  pub origin: String,
  /// Where the stores live (default: $XDG_DATA_HOME/reviewcache)
  pub data_dir: Option<PathBuf>,
  pub worker: WorkerConfig,
  pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub url: String,
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Name of the response cache
  pub cache_name: String,
  /// Paths fetched into the response cache on install
  pub manifest: Vec<String>,
  /// Address the interception proxy listens on
  pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  /// Seconds between connectivity probes
  pub interval_secs: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      origin: "http://localhost:8000".to_string(),
      data_dir: None,
      worker: WorkerConfig::default(),
      watch: WatchConfig::default(),
    }
  }
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:1337".to_string(),
      timeout_secs: 10,
    }
  }
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      cache_name: "v1".to_string(),
      manifest: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
      listen: "127.0.0.1:3000".to_string(),
    }
  }
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self { interval_secs: 5 }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./reviewcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/reviewcache/config.yaml
  ///
  /// Without a config file the defaults are used. `REVIEWCACHE_API_URL`
  /// overrides the API url either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var("REVIEWCACHE_API_URL") {
      config.api.url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("reviewcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid config with every default
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Directory holding the persistent stores and logs.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(APP_NAME))
  }
}
