use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable overriding `api.base_url`.
pub const ENV_API_URL: &str = "GIVEBACK_API_URL";
/// Environment variable overriding `api.timeout_ms`.
pub const ENV_API_TIMEOUT: &str = "GIVEBACK_API_TIMEOUT";
/// Environment variable holding the password for `login`/`register`.
pub const ENV_PASSWORD: &str = "GIVEBACK_PASSWORD";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL every relative request path is joined to
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-attempt timeout
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Retries after the first attempt for transient failures
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_ms: default_timeout_ms(),
      max_retries: default_max_retries(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Default time-to-live for cached responses
  #[serde(default = "default_ttl_ms")]
  pub ttl_ms: u64,
  /// How often expired entries are swept
  #[serde(default = "default_sweep_interval_secs")]
  pub sweep_interval_secs: u64,
  /// Maximum number of entries before least recently used ones are evicted
  #[serde(default = "default_capacity")]
  pub capacity: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_ms: default_ttl_ms(),
      sweep_interval_secs: default_sweep_interval_secs(),
      capacity: default_capacity(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:5000/api".to_string()
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_max_retries() -> u32 {
  3
}

fn default_ttl_ms() -> u64 {
  300_000
}

fn default_sweep_interval_secs() -> u64 {
  60
}

fn default_capacity() -> usize {
  500
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_millis(self.ttl_ms)
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_secs.max(1))
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./giveback.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/giveback/config.yaml
  ///
  /// With no file found the built-in defaults are used.
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
      None => {
        tracing::debug!("No config file found, using defaults");
        Config::default()
      }
    };

    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("giveback.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("giveback").join("config.yaml");
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
    // An empty file is a valid config with all defaults
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Apply environment overrides. `lookup` returns the value of a variable.
  pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
      self.api.base_url = url.trim().to_string();
    }

    if let Some(timeout) = lookup(ENV_API_TIMEOUT).filter(|v| !v.trim().is_empty()) {
      self.api.timeout_ms = timeout
        .trim()
        .parse()
        .map_err(|_| eyre!("{} must be a number of milliseconds, got '{}'", ENV_API_TIMEOUT, timeout))?;
    }

    Ok(())
  }

  /// Check the values that cannot be expressed by the types alone.
  pub fn validate(&self) -> Result<()> {
    let url = Url::parse(&self.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL '{}': {}", self.api.base_url, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!(
        "API base URL must use http or https, got '{}'",
        url.scheme()
      ));
    }
    if self.api.timeout_ms == 0 {
      return Err(eyre!("api.timeout_ms must be greater than zero"));
    }
    if self.cache.capacity == 0 {
      return Err(eyre!("cache.capacity must be greater than zero"));
    }
    Ok(())
  }

  /// Get the password for login/register from the environment.
  pub fn get_password() -> Result<String> {
    std::env::var(ENV_PASSWORD)
      .map_err(|_| eyre!("Password not found. Set the {} environment variable.", ENV_PASSWORD))
  }
}

/// Directory for persisted state and logs.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("giveback"))
}
