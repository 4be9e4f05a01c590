//! Configuration for actionq with per-project overrides.
//!
//! Config priority: explicit path > project-relative (.actionq/config.toml) > user (~/.config/actionq/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path:?}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Timing knobs for the scheduler loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
  /// Wait used when nothing is queued or deferred. Submissions wake the loop early.
  /// Default: 500
  #[serde(default = "default_idle_wait_ms")]
  pub idle_wait_ms: u64,

  /// Wait used while deferred actions exist and must be re-polled for readiness
  /// Default: 50
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

fn default_idle_wait_ms() -> u64 {
  500
}
fn default_poll_interval_ms() -> u64 {
  50
}

impl Default for SchedulerSettings {
  fn default() -> Self {
    Self {
      idle_wait_ms: default_idle_wait_ms(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

impl SchedulerSettings {
  pub fn idle_wait(&self) -> Duration {
    Duration::from_millis(self.idle_wait_ms.max(1))
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.max(1))
  }
}

// ============================================================================
// Log Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  #[serde(default = "default_log_level")]
  pub level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  #[serde(default = "default_log_rotation")]
  pub rotation: String,

  /// Directory for log files. Console logging when unset.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_rotation() -> String {
  "daily".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      rotation: default_log_rotation(),
      dir: None,
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(default)]
  pub scheduler: SchedulerSettings,

  #[serde(default)]
  pub log: LogConfig,
}

impl Config {
  /// Parse a config file, reporting read and parse failures
  pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load config for a project, with fallback to user config and then defaults.
  ///
  /// Unreadable or invalid files are skipped.
  pub fn load_for_project(project_path: &Path) -> Self {
    Self::load_layered(project_path, Self::user_config_path().as_deref())
  }

  /// Project file, then the given user file, then defaults
  fn load_layered(project_path: &Path, user_config_path: Option<&Path>) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(config) = Self::load_from_path(&project_config)
    {
      return config;
    }

    if let Some(user_config_path) = user_config_path
      && user_config_path.exists()
      && let Ok(config) = Self::load_from_path(user_config_path)
    {
      return config;
    }

    Self::default()
  }

  /// Load from an explicit path if given, otherwise resolve from the project directory
  pub fn resolve(explicit: Option<&Path>, project_path: &Path) -> Result<Self, ConfigError> {
    match explicit {
      Some(path) => Self::load_from_path(path),
      None => Ok(Self::load_for_project(project_path)),
    }
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ACTIONQ_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("actionq").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("actionq").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".actionq").join("config.toml")
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# actionq configuration
#
# Project config lives in .actionq/config.toml, user config in
# ~/.config/actionq/config.toml. Project settings win.

[scheduler]
# Wait (ms) when nothing is queued. Submissions wake the loop immediately.
idle_wait_ms = {idle_wait}
# Re-poll interval (ms) while deferred actions are waiting to become ready.
poll_interval_ms = {poll}

[log]
# off, error, warn, info, debug, trace (RUST_LOG overrides)
level = "{level}"
# daily, hourly, never (only used when dir is set)
rotation = "{rotation}"
# dir = "/var/log/actionq"
"#,
      idle_wait = defaults.scheduler.idle_wait_ms,
      poll = defaults.scheduler.poll_interval_ms,
      level = defaults.log.level,
      rotation = defaults.log.rotation,
    )
  }
}
