//! Bootstrap configuration loading and validation
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: a warning is logged and the built-in
//! defaults are used. A file that exists but does not parse is an error.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::categories::{major_of, DEFAULT_SUB_CATEGORY};
use crate::time::{bucket_zone, WindowSpec};
use crate::{Error, Result};

/// Environment variable naming the TOML file
pub const CONFIG_PATH_ENV: &str = "TREND_SVC_CONFIG";

const CONFIG_DIR_NAME: &str = "trend-svc";
const CONFIG_FILE_NAME: &str = "trend-svc.toml";

/// Where bucket counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process per-minute maps; a single replica only, counters are not shared
    Memory,
    /// Shared SQLite table; every replica pointing at the same file shares counters
    #[default]
    Sqlite,
}

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP listen address
    pub bind_addr: String,

    /// SQLite database file; defaults to the platform data directory
    pub database_path: Option<PathBuf>,

    /// Counter store backend
    pub store: StoreKind,

    /// Crawler sidecar endpoint polled once per cycle
    pub observer_url: Option<String>,

    /// Per-request timeout for the observer poll
    pub observer_timeout_secs: u64,

    /// Sub-category assigned when enrichment names none that resolve; must
    /// exist in the category taxonomy
    pub default_category: String,

    pub pipeline: TrendConfig,

    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5780".to_string(),
            database_path: None,
            store: StoreKind::default(),
            observer_url: None,
            observer_timeout_secs: 30,
            default_category: DEFAULT_SUB_CATEGORY.to_string(),
            pipeline: TrendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Resolved database path (configured or platform default)
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(default_database_path)
    }

    /// Validate the pipeline tunables and the default category
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if major_of(&self.default_category).is_none() {
            return Err(Error::Config(format!(
                "default_category '{}' is not a known sub-category",
                self.default_category
            )));
        }
        Ok(())
    }
}

/// Windowing, ranking and scheduling tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Seconds between scheduler ticks
    pub tick_interval_secs: u64,

    /// Cycle deadline; defaults to one tick interval
    pub cycle_timeout_secs: Option<u64>,

    /// Bucket time-to-live, refreshed on every write
    pub bucket_ttl_secs: u64,

    /// Length of the recent window `[now-5, now)`
    pub recent_window_minutes: u32,

    /// Length of the past window immediately before the recent one
    pub past_window_minutes: u32,

    /// Default size of the top-K listing
    pub top_k: usize,

    /// Minimum recent/past score ratio for a burst
    pub burst_ratio: f64,

    /// Minimum traffic for raising an existing aggregate
    pub traffic_floor: u64,

    /// Fixed UTC offset bucket keys are rendered in (540 = UTC+09:00)
    pub bucket_utc_offset_minutes: i32,

    /// Outbound async channel queue length
    pub channel_capacity: usize,

    /// Per-subscriber notification buffer
    pub notification_capacity: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            cycle_timeout_secs: None,
            bucket_ttl_secs: 15 * 60,
            recent_window_minutes: 5,
            past_window_minutes: 5,
            top_k: 10,
            burst_ratio: 3.0,
            traffic_floor: 2000,
            bucket_utc_offset_minutes: 9 * 60,
            channel_capacity: 1024,
            notification_capacity: 256,
        }
    }
}

impl TrendConfig {
    /// Check cross-field constraints
    ///
    /// The bucket TTL must outlive the longest window any reader uses, or a
    /// read could observe a partially evicted window.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(Error::Config("tick_interval_secs must be positive".to_string()));
        }
        if self.cycle_timeout_secs == Some(0) {
            return Err(Error::Config("cycle_timeout_secs must be positive".to_string()));
        }
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be positive".to_string()));
        }
        if !(self.burst_ratio.is_finite() && self.burst_ratio > 0.0) {
            return Err(Error::Config(format!("burst_ratio must be a positive number, got {}", self.burst_ratio)));
        }
        if self.recent_window_minutes == 0 || self.past_window_minutes == 0 {
            return Err(Error::Config("window lengths must be positive".to_string()));
        }
        if self.channel_capacity == 0 || self.notification_capacity == 0 {
            return Err(Error::Config("channel capacities must be positive".to_string()));
        }

        let longest_window_minutes = self
            .recent_window_minutes
            .checked_add(self.past_window_minutes)
            .ok_or_else(|| Error::Config("window lengths overflow".to_string()))?;
        let longest_window_secs = u64::from(longest_window_minutes) * 60;
        if self.bucket_ttl_secs <= longest_window_secs {
            return Err(Error::Config(format!(
                "bucket_ttl_secs ({}) must exceed the longest window read ({}s)",
                self.bucket_ttl_secs, longest_window_secs
            )));
        }

        bucket_zone(self.bucket_utc_offset_minutes).map_err(|e| Error::Config(e.to_string()))?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs.unwrap_or(self.tick_interval_secs))
    }

    pub fn bucket_ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_ttl_secs)
    }

    pub fn recent_window(&self) -> Result<WindowSpec> {
        WindowSpec::recent(self.recent_window_minutes)
    }

    pub fn past_window(&self) -> Result<WindowSpec> {
        self.recent_window()?.preceding(self.past_window_minutes)
    }

    pub fn zone(&self) -> Result<FixedOffset> {
        bucket_zone(self.bucket_utc_offset_minutes)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback log level when RUST_LOG is unset (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolve the TOML path: CLI argument, then environment, then platform default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    default_config_path()
}

/// Platform configuration file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Platform database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(CONFIG_DIR_NAME).join("trends.db"))
        .unwrap_or_else(|| PathBuf::from("./trend_data/trends.db"))
}

/// Load and validate the TOML file at `path`
///
/// Missing file → warning + defaults. Unreadable or invalid file → error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let parsed: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        parsed
    } else {
        warn!("Config file {} not found, using built-in defaults", path.display());
        TomlConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Render configuration as TOML text
pub fn render_toml_config(config: &TomlConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))
}

/// Write configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = render_toml_config(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
