use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://booklend-backend-1.onrender.com/";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Custom title for the header (defaults to the API host)
  pub title: Option<String>,
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  /// Used with BOOKLEND_PASSWORD to log in at start-up
  pub username: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      username: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds an entry nobody subscribes to is kept
  #[serde(default = "default_keep_unused_for_secs")]
  pub keep_unused_for_secs: u64,
  #[serde(default = "default_borrow_page_size")]
  pub borrow_page_size: u32,
}

impl CacheConfig {
  pub fn keep_unused_for(&self) -> Duration {
    Duration::from_secs(self.keep_unused_for_secs)
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      keep_unused_for_secs: default_keep_unused_for_secs(),
      borrow_page_size: default_borrow_page_size(),
    }
  }
}

fn default_keep_unused_for_secs() -> u64 {
  60
}

fn default_borrow_page_size() -> u32 {
  100
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl LogConfig {
  /// Configured directory, else the platform state or data directory.
  pub fn resolved_directory(&self) -> PathBuf {
    if let Some(dir) = &self.directory {
      return expand_home(dir);
    }
    dirs::state_dir()
      .or_else(dirs::data_dir)
      .map(|d| d.join("booklend"))
      .unwrap_or_else(|| PathBuf::from("."))
  }
}

fn expand_home(path: &Path) -> PathBuf {
  match path.strip_prefix("~") {
    Ok(rest) => dirs::home_dir()
      .map(|home| home.join(rest))
      .unwrap_or_else(|| path.to_path_buf()),
    Err(_) => path.to_path_buf(),
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./booklend.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/booklend/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("booklend.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("booklend").join("config.yaml");
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

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("BOOKLEND_API_URL") {
      if !url.trim().is_empty() {
        self.api.url = url;
      }
    }
    self
  }

  /// Header title: configured, else the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    url::Url::parse(&self.api.url)
      .ok()
      .and_then(|u| u.host_str().map(String::from))
      .unwrap_or_else(|| "booklend".to_string())
  }

  /// Bearer token from BOOKLEND_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("BOOKLEND_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// Password for the start-up login, from BOOKLEND_PASSWORD.
  pub fn get_password() -> Option<String> {
    std::env::var("BOOKLEND_PASSWORD")
      .ok()
      .filter(|p| !p.is_empty())
  }
}
