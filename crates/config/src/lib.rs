//! Configuration loading, normalization, and management for Vigil.
//!
//! Loads configuration from `~/.vigil/config.toml` with environment
//! variable overrides. Invalid values are never fatal: `normalize()`
//! replaces them with safe defaults and reports what it changed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.vigil/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Integration token identifying the project at the collector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Collector address the transport connects to
    #[serde(default = "default_collector_endpoint")]
    pub collector_endpoint: String,

    /// Emit extra diagnostics (auto-finished spans, dropped records)
    #[serde(default)]
    pub debug: bool,

    /// Breadcrumb buffer and instrumentation hooks
    #[serde(default)]
    pub breadcrumbs: BreadcrumbsConfig,

    /// Performance tracking and sampling
    #[serde(default)]
    pub performance: PerformanceConfig,

    /// Connection and reconnection policy
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_collector_endpoint() -> String {
    "127.0.0.1:7070".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for VigilConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VigilConfig")
            .field("token", &redact(&self.token))
            .field("collector_endpoint", &self.collector_endpoint)
            .field("debug", &self.debug)
            .field("breadcrumbs", &self.breadcrumbs)
            .field("performance", &self.performance)
            .field("transport", &self.transport)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreadcrumbsConfig {
    /// Ring buffer capacity
    #[serde(default = "default_max_breadcrumbs")]
    pub max_breadcrumbs: usize,

    /// Record outbound HTTP requests (both `send` and `execute` paths)
    #[serde(default = "default_true")]
    pub track_fetch: bool,

    /// Record navigation changes
    #[serde(default = "default_true")]
    pub track_navigation: bool,

    /// Record UI clicks
    #[serde(default = "default_true")]
    pub track_clicks: bool,
}

fn default_max_breadcrumbs() -> usize {
    15
}

impl Default for BreadcrumbsConfig {
    fn default() -> Self {
        Self {
            max_breadcrumbs: default_max_breadcrumbs(),
            track_fetch: true,
            track_navigation: true,
            track_clicks: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Probability in `[0, 1]` that a mid-band transaction is kept
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Successful transactions shorter than this are dropped
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,

    /// Transactions at least this long are always kept
    #[serde(default = "default_critical_duration_threshold_ms")]
    pub critical_duration_threshold_ms: u64,

    /// How often the send queue is flushed
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
}

fn default_sample_rate() -> f64 {
    1.0
}
fn default_threshold_ms() -> u64 {
    20
}
fn default_critical_duration_threshold_ms() -> u64 {
    500
}
fn default_batch_interval_ms() -> u64 {
    3000
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: default_sample_rate(),
            threshold_ms: default_threshold_ms(),
            critical_duration_threshold_ms: default_critical_duration_threshold_ms(),
            batch_interval_ms: default_batch_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Failed connection attempts before automatic retries stop
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,

    /// Delay between automatic retries
    #[serde(default = "default_reconnection_timeout_ms")]
    pub reconnection_timeout_ms: u64,

    /// Outbound backlog cap while not connected (oldest dropped first)
    #[serde(default = "default_max_queued_messages")]
    pub max_queued_messages: usize,
}

fn default_reconnection_attempts() -> u32 {
    5
}
fn default_reconnection_timeout_ms() -> u64 {
    10_000
}
fn default_max_queued_messages() -> usize {
    1000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_timeout_ms: default_reconnection_timeout_ms(),
            max_queued_messages: default_max_queued_messages(),
        }
    }
}

impl VigilConfig {
    /// Load configuration from the default path (~/.vigil/config.toml).
    ///
    /// Environment variables override file values:
    /// - `VIGIL_TOKEN`
    /// - `VIGIL_COLLECTOR_ENDPOINT`
    /// - `VIGIL_DEBUG` (`1` or `true`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(token) = std::env::var("VIGIL_TOKEN") {
            config.token = Some(token);
        }

        if let Ok(endpoint) = std::env::var("VIGIL_COLLECTOR_ENDPOINT") {
            config.collector_endpoint = endpoint;
        }

        if let Ok(debug) = std::env::var("VIGIL_DEBUG") {
            config.debug = matches!(debug.as_str(), "1" | "true" | "TRUE" | "yes");
        }

        config.normalize();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.normalize();
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".vigil")
    }

    /// Replace invalid values with safe defaults.
    ///
    /// Returns one human-readable line per correction; each is also logged.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut fixes = Vec::new();

        let rate = self.performance.sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            self.performance.sample_rate = 1.0;
            fixes.push(format!(
                "performance.sample_rate {rate} is outside [0, 1], using 1"
            ));
        }

        if self.breadcrumbs.max_breadcrumbs == 0 {
            self.breadcrumbs.max_breadcrumbs = default_max_breadcrumbs();
            fixes.push(format!(
                "breadcrumbs.max_breadcrumbs must be > 0, using {}",
                default_max_breadcrumbs()
            ));
        }

        if self.performance.batch_interval_ms == 0 {
            self.performance.batch_interval_ms = default_batch_interval_ms();
            fixes.push(format!(
                "performance.batch_interval_ms must be > 0, using {}",
                default_batch_interval_ms()
            ));
        }

        let threshold = self.performance.threshold_ms;
        let critical = self.performance.critical_duration_threshold_ms;
        if critical < threshold {
            self.performance.critical_duration_threshold_ms = threshold;
            fixes.push(format!(
                "performance.critical_duration_threshold_ms {critical} is below threshold_ms, \
                 using {threshold}"
            ));
        }

        if self.transport.reconnection_timeout_ms == 0 {
            self.transport.reconnection_timeout_ms = default_reconnection_timeout_ms();
            fixes.push(format!(
                "transport.reconnection_timeout_ms must be > 0, using {}",
                default_reconnection_timeout_ms()
            ));
        }

        if self.transport.max_queued_messages == 0 {
            self.transport.max_queued_messages = default_max_queued_messages();
            fixes.push(format!(
                "transport.max_queued_messages must be > 0, using {}",
                default_max_queued_messages()
            ));
        }

        if self.collector_endpoint.trim().is_empty() {
            self.collector_endpoint = default_collector_endpoint();
            fixes.push(format!(
                "collector_endpoint is empty, using {}",
                default_collector_endpoint()
            ));
        }

        for fix in &fixes {
            tracing::warn!("Configuration corrected: {fix}");
        }
        fixes
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            token: None,
            collector_endpoint: default_collector_endpoint(),
            debug: false,
            breadcrumbs: BreadcrumbsConfig::default(),
            performance: PerformanceConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },
}

impl From<ConfigError> for vigil_core::Error {
    fn from(err: ConfigError) -> Self {
        vigil_core::Error::Config {
            message: err.to_string(),
        }
    }
}
