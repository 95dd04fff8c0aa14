//! Test utilities for cctally.
//!
//! Provides shared helpers, test data factories, and assertion macros
//! for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cctally::test_utils::*;
//!
//! let dir = TestDir::new();
//! let tree = LogTree::new(dir.path());
//! let line = assistant_line("msg_1", "req_1", "claude-sonnet-4-5", TokenUsage::new(10, 5, 0, 0));
//! tree.session("-home-me-app", "abc", &[&line]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::core::models::{
    ModelBreakdown, ModelFamily, ModelIdentifier, Provenance, SessionSummary, TokenStats,
    TokenUsage,
};
use crate::core::pricing::{ModelPricing, PricingSnapshot};

// =============================================================================
// Log line builders
// =============================================================================

/// An assistant log line with nested `message` fields and a top-level `requestId`.
///
/// No `sessionId` or `timestamp`, so the session id comes from the file name and the
/// entry only counts toward session summaries.
#[must_use]
pub fn assistant_line(message_id: &str, request_id: &str, model: &str, usage: TokenUsage) -> String {
    json!({
        "type": "assistant",
        "requestId": request_id,
        "message": {
            "id": message_id,
            "model": model,
            "usage": usage_json(usage),
        },
    })
    .to_string()
}

/// Like [`assistant_line`] but stamped with `at`, so time-bounded summaries see it.
#[must_use]
pub fn timestamped_line(
    message_id: &str,
    request_id: &str,
    model: &str,
    usage: TokenUsage,
    at: DateTime<Utc>,
) -> String {
    json!({
        "type": "assistant",
        "timestamp": at.to_rfc3339(),
        "requestId": request_id,
        "message": {
            "id": message_id,
            "model": model,
            "usage": usage_json(usage),
        },
    })
    .to_string()
}

fn usage_json(usage: TokenUsage) -> serde_json::Value {
    json!({
        "input_tokens": usage.input,
        "output_tokens": usage.output,
        "cache_creation_input_tokens": usage.cache_write,
        "cache_read_input_tokens": usage.cache_read,
    })
}

// =============================================================================
// Log tree
// =============================================================================

/// Builds a session-log root laid out like the assistant's:
/// `<root>/<project>/<session>.jsonl` and `<root>/<project>/<session>/subagents/<name>.jsonl`.
#[derive(Debug, Clone)]
pub struct LogTree {
    root: PathBuf,
}

impl LogTree {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a session file and return its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn session(&self, project: &str, session_id: &str, lines: &[&str]) -> PathBuf {
        let path = self.root.join(project).join(format!("{session_id}.jsonl"));
        write_lines(&path, lines);
        path
    }

    /// Write a sub-agent file for `session_id` and return its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn subagent(&self, project: &str, session_id: &str, name: &str, lines: &[&str]) -> PathBuf {
        let path = self
            .root
            .join(project)
            .join(session_id)
            .join(crate::core::session_logs::SUBAGENT_DIR)
            .join(format!("{name}.jsonl"));
        write_lines(&path, lines);
        path
    }

    /// Append lines to an existing file.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be opened.
    pub fn append(path: &Path, lines: &[&str]) {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(path)
            .expect("open log for append");
        for line in lines {
            writeln!(file, "{line}").expect("append log line");
        }
    }
}

fn write_lines(path: &Path, lines: &[&str]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create log directory");
    }
    fs::write(path, lines.join("\n")).expect("Failed to write log file");
}

/// Backdate a file's modification time.
///
/// # Panics
///
/// Panics if the file cannot be opened or its mtime set.
pub fn set_mtime_ago(path: &Path, ago: Duration) {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .expect("open file for mtime");
    file.set_modified(SystemTime::now() - ago)
        .expect("set mtime");
}

// =============================================================================
// Test Data Factories
// =============================================================================

/// A two-model price table: sonnet (extended-context) and haiku.
#[must_use]
pub fn make_test_pricing_snapshot(provenance: Provenance) -> PricingSnapshot {
    let mut models = HashMap::new();
    models.insert(
        "claude-sonnet-4-5".to_string(),
        ModelPricing::per_million(3.0, 15.0, 3.75, 0.30),
    );
    models.insert(
        "claude-haiku-4-5".to_string(),
        ModelPricing::per_million(1.0, 5.0, 1.25, 0.10),
    );
    PricingSnapshot::new(
        models,
        Some(["claude-sonnet-4-5".to_string()].into_iter().collect()),
        provenance,
        Utc::now(),
    )
}

/// A summary with one sonnet model and realistic totals.
#[must_use]
pub fn make_test_summary() -> SessionSummary {
    let tokens = TokenUsage::new(12_000, 3_400, 1_000, 50_000);
    let stats = TokenStats {
        tokens,
        cost_usd: 0.1035,
        entry_count: 7,
    };
    let model = ModelIdentifier {
        raw_id: "claude-sonnet-4-5-20250929".to_string(),
        family: ModelFamily::Sonnet,
        version: Some("4.5".to_string()),
        pricing_key: "claude-sonnet-4-5".to_string(),
        is_fallback: false,
    };
    let mut by_model = BTreeMap::new();
    by_model.insert(
        model.pricing_key.clone(),
        ModelBreakdown {
            stats,
            is_fallback: false,
        },
    );
    let now = Utc::now();
    SessionSummary {
        session_id: Some("3f2a9c1e".to_string()),
        stats,
        models: BTreeSet::from([model]),
        by_model,
        first_entry_at: Some(now - chrono::Duration::minutes(40)),
        last_entry_at: Some(now),
    }
}

/// A remote price table document in the upstream shape, including a non-vendor entry.
#[must_use]
pub fn make_test_remote_table() -> serde_json::Value {
    json!({
        "sample_spec": {"input_cost_per_token": 0.0, "output_cost_per_token": 0.0},
        "claude-sonnet-4-5": {
            "input_cost_per_token": 3e-6,
            "output_cost_per_token": 1.5e-5,
            "cache_creation_input_token_cost": 3.75e-6,
            "cache_read_input_token_cost": 3e-7,
            "max_input_tokens": 1_000_000,
        },
        "claude-opus-4-1": {
            "input_cost_per_token": 1.5e-5,
            "output_cost_per_token": 7.5e-5,
            "max_input_tokens": 200_000,
        },
        "gpt-4o": {"input_cost_per_token": 2.5e-6, "output_cost_per_token": 1e-5},
    })
}

/// Sample config file content.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
log_root = "/tmp/cctally-logs"

[pricing]
refresh_interval_hours = 6
cache_max_age_hours = 6
offline = true

[sessions]
active_minutes = 20

[history]
retention_days = 14

[watch]
debounce_ms = 500
"#
    .to_string()
}

// =============================================================================
// Temp directories
// =============================================================================

/// A temporary directory that cleans up on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file, with parent directories, in the temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Read a file from the temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {
        let json = $json;
        if let Err(e) = serde_json::from_str::<serde_json::Value>(json) {
            panic!("Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}", e, json);
        }
    };
}

/// Assert approximate floating point equality.
///
/// ```rust,ignore
/// assert_float_eq!(0.1 + 0.2, 0.3);
/// assert_float_eq!(1.0, 1.05, 0.1);
/// ```
#[macro_export]
macro_rules! assert_float_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_float_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {
        let left: f64 = $left;
        let right: f64 = $right;
        let epsilon: f64 = $epsilon;
        assert!(
            (left - right).abs() < epsilon,
            "Float equality assertion failed: {} != {} (epsilon: {})",
            left,
            right,
            epsilon
        );
    };
}

/// Assert that a string does NOT contain ANSI escape codes.
#[macro_export]
macro_rules! assert_no_ansi_codes {
    ($text:expr) => {
        let text = $text;
        assert!(
            !text.contains('\x1b'),
            "Expected string to NOT contain ANSI escape codes.\n\nActual string:\n{:?}",
            text
        );
    };
}

// =============================================================================
// Test Helpers
// =============================================================================

/// Strip ANSI escape codes from a string.
#[must_use]
pub fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}
