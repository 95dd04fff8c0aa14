//! Test logging infrastructure for structured test output and debugging.
#![allow(dead_code)]
//!
//! A `TestLogger` per test records phases and elapsed time on stderr, which
//! `cargo test` shows only for failing tests.
//!
//! # Environment Variables
//!
//! - `TEST_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `TEST_LOG_JSON` - "1" or "true" for one JSON object per line

use std::env;
use std::fmt::Display;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from string, case-insensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize)]
struct LogLine<'a> {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    min_level: LogLevel,
    json: bool,
}

fn settings() -> Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    *SETTINGS.get_or_init(|| Settings {
        min_level: env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Info),
        json: env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

/// Per-test logger with phase and duration tracking.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    current_phase: Mutex<String>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            current_phase: Mutex::new("setup".to_string()),
        };
        logger.log(LogLevel::Debug, "start");
        logger
    }

    /// Enter a named phase (setup, execute, verify, ...).
    pub fn phase(&self, name: &str) {
        if let Ok(mut phase) = self.current_phase.lock() {
            *phase = name.to_string();
        }
        self.log(LogLevel::Debug, &format!("phase: {name}"));
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Record an outgoing HTTP request.
    pub fn http_request(&self, method: &str, url: &str) {
        self.log(LogLevel::Debug, &format!("{method} {url}"));
    }

    /// Record a command invocation.
    pub fn command(&self, args: &[&str]) {
        self.log(LogLevel::Debug, &format!("cctally {}", args.join(" ")));
    }

    pub fn finish_ok(&self) {
        self.log(LogLevel::Info, "ok");
    }

    fn log(&self, level: LogLevel, message: &str) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self
            .current_phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let elapsed_ms = self.start_time.elapsed().as_millis();

        if settings.json {
            let line = LogLine {
                timestamp: Utc::now(),
                level,
                test: &self.test_name,
                phase: &phase,
                message,
                elapsed_ms,
            };
            if let Ok(json) = serde_json::to_string(&line) {
                eprintln!("{json}");
            }
        } else {
            eprintln!(
                "[{level:<5}] {} ({phase}, {elapsed_ms}ms): {message}",
                self.test_name
            );
        }
    }
}
