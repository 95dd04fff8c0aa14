//! Test fixtures and factory functions for integration tests.
#![allow(dead_code)]
//!
//! Session-log and price-table fixtures live under `tests/fixtures/`. The helpers
//! here copy them into a temporary log root laid out like the assistant's.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::fixtures::*;
//!
//! let dir = TestDir::new();
//! let session = install_session_fixture(dir.path(), "-home-dev-webapp", "session_basic");
//! let table: serde_json::Value = load_fixture("pricing/remote_table.json");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;

use cctally::core::pricing_refresh::RefreshSettings;

/// Cost of the two accounted entries in `logs/session_basic.jsonl`: one
/// bundled-priced Sonnet turn plus one turn carrying a precomputed cost.
pub const BASIC_SESSION_COST: f64 = 0.007_875 + 0.5;

/// Session id declared inside `logs/session_basic.jsonl`.
pub const BASIC_SESSION_ID: &str = "4f1c2d9e-basic";

// =============================================================================
// Fixture Loading
// =============================================================================

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Load a JSON fixture file and deserialize it.
///
/// # Panics
///
/// Panics if the file cannot be read or parsed.
pub fn load_fixture<T: DeserializeOwned>(path: &str) -> T {
    let full_path = fixtures_dir().join(path);
    let content = fs::read_to_string(&full_path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e))
}

/// Load a text fixture file as a string.
///
/// # Panics
///
/// Panics if the file cannot be read.
pub fn load_fixture_text(path: &str) -> String {
    let full_path = fixtures_dir().join(path);
    fs::read_to_string(&full_path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e))
}

/// Copy `logs/<name>.jsonl` to `<root>/<project>/<name>.jsonl`.
///
/// # Panics
///
/// Panics if the copy fails.
pub fn install_session_fixture(root: &Path, project: &str, name: &str) -> PathBuf {
    let dest = root.join(project).join(format!("{name}.jsonl"));
    fs::create_dir_all(dest.parent().expect("session path has a parent"))
        .expect("create project dir");
    fs::write(&dest, load_fixture_text(&format!("logs/{name}.jsonl"))).expect("write session");
    dest
}

// =============================================================================
// Settings
// =============================================================================

/// Refresh settings pointed at `url` with short delays for tests.
#[must_use]
pub fn refresh_settings(url: &str) -> RefreshSettings {
    RefreshSettings {
        url: url.to_string(),
        cache_max_age: Duration::from_secs(3600),
        retry_delay: Duration::from_millis(50),
        refresh_interval: Duration::from_secs(3600),
        timeout: Duration::from_secs(5),
        offline: false,
    }
}

/// Settings that never touch the network.
#[must_use]
pub fn offline_settings() -> RefreshSettings {
    RefreshSettings {
        offline: true,
        ..refresh_settings("http://127.0.0.1:9/unused")
    }
}
