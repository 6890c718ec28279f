use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub jira: JiraConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
  /// Jira Cloud domain, e.g. "yourteam.atlassian.net"
  pub domain: String,
  /// Email of the account whose API token is used for the Jira user API
  pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Snapshot TTL in seconds. Short enough that a missed sync degrades to
  /// "no data" rather than misleadingly stale timers.
  pub timer_ttl_secs: u64,
  /// Identity record TTL in seconds (the same people run timers repeatedly)
  pub user_ttl_secs: u64,
  /// Stop-marker TTL in seconds; bounds how long a stale in-flight sync
  /// write is suppressed after a stop
  pub stop_marker_ttl_secs: u64,
  /// Override for the cache database path
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      timer_ttl_secs: 600,
      user_ttl_secs: 172_800,
      stop_marker_ttl_secs: 30,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Interval between scheduled sync runs in watch mode
  pub interval_secs: u64,
  /// Deadline for one whole sync run
  pub run_timeout_secs: u64,
  /// Extra attempts after a failed run, before waiting for the next trigger
  pub retries: u32,
  /// Per-request timeout on the shared HTTP client
  pub http_timeout_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 120,
      run_timeout_secs: 60,
      retries: 2,
      http_timeout_secs: 30,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./clocksync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/clocksync/config.yaml
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
        "No configuration file found. Create one at ~/.config/clocksync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("clocksync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("clocksync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the Jira browser-session cookie from environment variables.
  ///
  /// Checks CLOCKSYNC_JIRA_COOKIE first, then JIRA_FULL_COOKIE as fallback.
  pub fn get_session_cookie() -> Result<String> {
    std::env::var("CLOCKSYNC_JIRA_COOKIE")
      .or_else(|_| std::env::var("JIRA_FULL_COOKIE"))
      .map_err(|_| {
        eyre!(
          "Jira session cookie not found. Set CLOCKSYNC_JIRA_COOKIE or JIRA_FULL_COOKIE environment variable."
        )
      })
  }

  /// Get the Atlassian API token from environment variables.
  ///
  /// Checks CLOCKSYNC_API_TOKEN first, then ATLASSIAN_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("CLOCKSYNC_API_TOKEN")
      .or_else(|_| std::env::var("ATLASSIAN_API_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Atlassian API token not found. Set CLOCKSYNC_API_TOKEN or ATLASSIAN_API_TOKEN environment variable."
        )
      })
  }
}
