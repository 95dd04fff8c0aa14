//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/cctally/config.toml`
//! - macOS: `~/Library/Application Support/dev.cctally.cctally/config.toml`
//! - Windows: `%APPDATA%/cctally/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `CCTALLY_LOG_ROOT`: Session log root directory
//! - `CCTALLY_PRICING_URL`: Remote price table URL
//! - `CCTALLY_OFFLINE`: Never fetch remote prices (1, true, yes)
//! - `CCTALLY_FORMAT`: Output format (human, json)
//! - `CCTALLY_NO_COLOR` or `NO_COLOR`: Disable colors (1, true, yes)
//! - `CCTALLY_VERBOSE`: Enable verbose output (1, true, yes)
//! - `CCTALLY_PRETTY`: Pretty-print JSON output (1, true, yes)
//! - `CCTALLY_CONFIG`: Override config file path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use super::paths::default_log_root;
use crate::cli::args::{Cli, OutputFormat};
use crate::core::debounce::DEFAULT_QUIET_PERIOD;
use crate::core::pricing_refresh::{DEFAULT_PRICING_URL, RefreshSettings};
use crate::error::{Result, TallyError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the session log root.
pub const ENV_LOG_ROOT: &str = "CCTALLY_LOG_ROOT";
/// Environment variable for the remote price table URL.
pub const ENV_PRICING_URL: &str = "CCTALLY_PRICING_URL";
/// Environment variable to disable remote price fetches.
pub const ENV_OFFLINE: &str = "CCTALLY_OFFLINE";
/// Environment variable for output format.
pub const ENV_FORMAT: &str = "CCTALLY_FORMAT";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "CCTALLY_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";
/// Environment variable for verbose output.
pub const ENV_VERBOSE: &str = "CCTALLY_VERBOSE";
/// Environment variable for pretty JSON output.
pub const ENV_PRETTY: &str = "CCTALLY_PRETTY";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "CCTALLY_CONFIG";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Output format.
    pub format: OutputFormat,
    /// Whether to disable colored output.
    pub no_color: bool,
    /// Whether verbose logging is enabled.
    pub verbose: bool,
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
    /// Root directory of the assistant's session logs.
    pub log_root: PathBuf,
    /// Pricing refresh pipeline settings.
    pub pricing: RefreshSettings,
    /// A session counts as active if written within this window.
    pub active_window: Duration,
    /// Sub-agent logs older than this are left out of context reports.
    pub subagent_recency: Duration,
    /// Whether `watch` records history samples.
    pub history_enabled: bool,
    /// Samples older than this are pruned.
    pub history_retention: Duration,
    /// Quiet period before re-aggregating after log changes.
    pub debounce: Duration,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub format: ConfigSource,
    pub no_color: ConfigSource,
    pub verbose: ConfigSource,
    pub pretty: ConfigSource,
    pub log_root: ConfigSource,
    pub pricing_url: ConfigSource,
    pub offline: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - An environment variable holds an unusable value
    /// - No log root can be determined (no home directory and nothing configured)
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = Self::load_config()?;
        config.validate()?;
        Self::resolve_with(cli, &config)
    }

    /// Resolve against an already-loaded config file.
    ///
    /// # Errors
    ///
    /// See [`ResolvedConfig::resolve`].
    pub fn resolve_with(cli: &Cli, config: &Config) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let format = Self::resolve_format(cli, &mut sources.format)?;
        let no_color = Self::resolve_no_color(cli, config, &mut sources.no_color);
        let verbose = Self::resolve_verbose(cli, &mut sources.verbose);
        let pretty = Self::resolve_pretty(cli, config, &mut sources.pretty);
        let log_root = Self::resolve_log_root(cli, config, &mut sources.log_root)?;
        let url = Self::resolve_pricing_url(config, &mut sources.pricing_url);
        let offline = Self::resolve_offline(cli, config, &mut sources.offline);

        let pricing = RefreshSettings {
            url,
            cache_max_age: hours(config.pricing.cache_max_age_hours),
            retry_delay: Duration::from_secs(config.pricing.retry_delay_secs),
            refresh_interval: hours(config.pricing.refresh_interval_hours),
            timeout: Duration::from_secs(config.pricing.timeout_secs),
            offline,
        };

        Ok(Self {
            format,
            no_color,
            verbose,
            pretty,
            log_root,
            pricing,
            active_window: minutes(config.sessions.active_minutes),
            subagent_recency: minutes(config.sessions.subagent_recency_minutes),
            history_enabled: config.history.enabled,
            history_retention: days(config.history.retention_days),
            debounce: Duration::from_millis(config.watch.debounce_ms),
            sources,
        })
    }

    /// Load config file, respecting the `CCTALLY_CONFIG` override.
    fn load_config() -> Result<Config> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            if !path.trim().is_empty() {
                tracing::debug!(path, "Using config override from {ENV_CONFIG}");
                return Config::load_from(Path::new(&path));
            }
        }
        Config::load()
    }

    fn resolve_format(cli: &Cli, source: &mut ConfigSource) -> Result<OutputFormat> {
        // 1. CLI --json or an explicit --format
        if cli.json || cli.format != OutputFormat::Human {
            *source = ConfigSource::Cli;
            return Ok(cli.effective_format());
        }

        // 2. Environment variable
        if let Ok(value) = std::env::var(ENV_FORMAT) {
            *source = ConfigSource::Env;
            return Self::parse_format(&value).ok_or_else(|| TallyError::ConfigInvalid {
                key: ENV_FORMAT.to_string(),
                value,
                message: "expected one of: human, json".to_string(),
            });
        }

        // 3. Default
        *source = ConfigSource::Default;
        Ok(OutputFormat::Human)
    }

    fn parse_format(value: &str) -> Option<OutputFormat> {
        match value.trim().to_lowercase().as_str() {
            "human" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    /// Resolve `no_color`: CLI, then either env var, then `[output] color = false`.
    fn resolve_no_color(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }

        if Self::is_env_truthy(ENV_NO_COLOR) || std::env::var_os(ENV_NO_COLOR_STD).is_some() {
            *source = ConfigSource::Env;
            return true;
        }

        if !config.output.color {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        *source = ConfigSource::Default;
        false
    }

    fn resolve_verbose(cli: &Cli, source: &mut ConfigSource) -> bool {
        if cli.verbose {
            *source = ConfigSource::Cli;
            return true;
        }

        if Self::is_env_truthy(ENV_VERBOSE) {
            *source = ConfigSource::Env;
            return true;
        }

        // No config file setting for verbose
        *source = ConfigSource::Default;
        false
    }

    fn resolve_pretty(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        if cli.pretty {
            *source = ConfigSource::Cli;
            return true;
        }

        if Self::is_env_truthy(ENV_PRETTY) {
            *source = ConfigSource::Env;
            return true;
        }

        if config.output.pretty {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        *source = ConfigSource::Default;
        false
    }

    fn resolve_log_root(cli: &Cli, config: &Config, source: &mut ConfigSource) -> Result<PathBuf> {
        if let Some(root) = &cli.log_root {
            *source = ConfigSource::Cli;
            return Ok(root.clone());
        }

        if let Some(root) = std::env::var_os(ENV_LOG_ROOT).filter(|v| !v.is_empty()) {
            *source = ConfigSource::Env;
            return Ok(PathBuf::from(root));
        }

        if let Some(root) = &config.general.log_root {
            *source = ConfigSource::ConfigFile;
            return Ok(expand_home(root));
        }

        *source = ConfigSource::Default;
        default_log_root().ok_or(TallyError::HomeDirUnavailable)
    }

    fn resolve_pricing_url(config: &Config, source: &mut ConfigSource) -> String {
        if let Ok(url) = std::env::var(ENV_PRICING_URL) {
            if !url.trim().is_empty() {
                *source = ConfigSource::Env;
                return url;
            }
        }

        if config.pricing.url != DEFAULT_PRICING_URL {
            *source = ConfigSource::ConfigFile;
        } else {
            *source = ConfigSource::Default;
        }
        config.pricing.url.clone()
    }

    fn resolve_offline(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        if cli.offline {
            *source = ConfigSource::Cli;
            return true;
        }

        if Self::is_env_truthy(ENV_OFFLINE) {
            *source = ConfigSource::Env;
            return true;
        }

        if config.pricing.offline {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        *source = ConfigSource::Default;
        false
    }

    /// Check if an environment variable is set to a truthy value.
    fn is_env_truthy(var: &str) -> bool {
        std::env::var(var)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}

/// Longest interval any duration setting may express: ten years.
const MAX_SETTING_SECS: u64 = 10 * 365 * 86_400;

const fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(3600))
}

const fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

const fn days(n: u32) -> Duration {
    Duration::from_secs((n as u64).saturating_mul(86_400))
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => super::paths::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

// =============================================================================
// Config file
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub pricing: PricingConfig,
    pub sessions: SessionsConfig,
    pub history: HistoryConfig,
    pub watch: WatchConfig,
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Session log root; `~/` is expanded.
    pub log_root: Option<PathBuf>,
}

/// Pricing refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub url: String,
    pub refresh_interval_hours: u64,
    pub cache_max_age_hours: u64,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub offline: bool,
}

/// Session discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub active_minutes: u64,
    pub subagent_recency_minutes: u64,
}

/// Usage-history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub retention_days: u32,
}

/// Watch-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub color: bool,
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let defaults = RefreshSettings::default();
        Self {
            url: DEFAULT_PRICING_URL.to_string(),
            refresh_interval_hours: defaults.refresh_interval.as_secs() / 3600,
            cache_max_age_hours: defaults.cache_max_age.as_secs() / 3600,
            retry_delay_secs: defaults.retry_delay.as_secs(),
            timeout_secs: defaults.timeout.as_secs(),
            offline: false,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            active_minutes: 30,
            subagent_recency_minutes: 10,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 30,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: u64::try_from(DEFAULT_QUIET_PERIOD.as_millis()).unwrap_or(1500),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: true,
            pretty: false,
        }
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TallyError::ConfigParse {
            path: path.display().to_string(),
            line: e.span().map(|span| line_of(&content, span.start)),
            message: e.message().to_string(),
        })
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TallyError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// Intervals, timeouts, and the retention window must be non-zero, and the
    /// pricing URL must be http(s).
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("pricing.refresh_interval_hours", self.pricing.refresh_interval_hours),
            ("pricing.cache_max_age_hours", self.pricing.cache_max_age_hours),
            ("pricing.timeout_secs", self.pricing.timeout_secs),
            ("sessions.active_minutes", self.sessions.active_minutes),
            ("history.retention_days", u64::from(self.history.retention_days)),
            ("watch.debounce_ms", self.watch.debounce_ms),
        ];

        for (key, value) in nonzero {
            if value == 0 {
                return Err(TallyError::ConfigInvalid {
                    key: key.to_string(),
                    value: value.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }

        let bounded = [
            ("pricing.refresh_interval_hours", self.pricing.refresh_interval_hours, 3600),
            ("pricing.cache_max_age_hours", self.pricing.cache_max_age_hours, 3600),
            ("pricing.retry_delay_secs", self.pricing.retry_delay_secs, 1),
            ("pricing.timeout_secs", self.pricing.timeout_secs, 1),
            ("sessions.active_minutes", self.sessions.active_minutes, 60),
            ("sessions.subagent_recency_minutes", self.sessions.subagent_recency_minutes, 60),
            ("history.retention_days", u64::from(self.history.retention_days), 86_400),
        ];

        for (key, value, unit_secs) in bounded {
            if value.checked_mul(unit_secs).is_none_or(|secs| secs > MAX_SETTING_SECS) {
                return Err(TallyError::ConfigInvalid {
                    key: key.to_string(),
                    value: value.to_string(),
                    message: "must not exceed ten years".to_string(),
                });
            }
        }

        if !(self.pricing.url.starts_with("http://") || self.pricing.url.starts_with("https://")) {
            return Err(TallyError::ConfigInvalid {
                key: "pricing.url".to_string(),
                value: self.pricing.url.clone(),
                message: "must be an http(s) URL".to_string(),
            });
        }

        Ok(())
    }
}

/// 1-based line number of a byte offset.
fn line_of(content: &str, offset: usize) -> usize {
    content
        .get(..offset)
        .map_or(1, |prefix| prefix.matches('\n').count() + 1)
}
