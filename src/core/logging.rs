//! Diagnostic logging to stderr or a file.
//!
//! Level and format come from `--log-level` / `--json-output` / `-v`, falling back
//! to `CCTALLY_LOG`, `CCTALLY_LOG_FORMAT` and `CCTALLY_LOG_FILE`. `RUST_LOG`, when
//! set, replaces the computed filter entirely.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_LEVEL_ENV: &str = "CCTALLY_LOG";
const LOG_FORMAT_ENV: &str = "CCTALLY_LOG_FORMAT";
const LOG_FILE_ENV: &str = "CCTALLY_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Single line, terse.
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Parse a level name. Accepts `verbose`, `warning` and `critical` as aliases.
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "verbose" | "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" | "crit" => Some(Level::ERROR),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Effective logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::ERROR,
            format: LogFormat::Human,
            file: None,
        }
    }
}

impl LogSettings {
    /// Merge CLI flags over environment variables.
    ///
    /// `verbose` raises the level to debug unless a level was given explicitly.
    #[must_use]
    pub fn resolve(cli_level: Option<&str>, json_output: bool, verbose: bool) -> Self {
        let explicit = cli_level
            .and_then(parse_level)
            .or_else(|| env_value(LOG_LEVEL_ENV).as_deref().and_then(parse_level));

        let level = match explicit {
            Some(level) => level,
            None if verbose => Level::DEBUG,
            None => Level::ERROR,
        };

        let format = if json_output {
            LogFormat::Json
        } else {
            env_value(LOG_FORMAT_ENV)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default()
        };

        Self {
            level,
            format,
            file: env_value(LOG_FILE_ENV).map(PathBuf::from),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("cctally={}", self.level.as_str().to_lowercase()))
        })
    }

    fn writer(&self) -> BoxMakeWriter {
        let file = self.file.as_ref().and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        match file {
            Some(file) => BoxMakeWriter::new(Mutex::new(file)),
            None => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_writer(settings.writer());

    let installed = match settings.format {
        LogFormat::Json => builder
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(true).try_init(),
        LogFormat::Human => builder.with_target(false).without_time().try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(level = %settings.level, format = ?settings.format, "Logging initialized");
    }
}
