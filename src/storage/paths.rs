//! Application paths for config, cache, data, and the assistant's session logs.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Directory, relative to home, where the assistant writes session logs.
pub const DEFAULT_LOG_ROOT: &str = ".claude/projects";

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Cache directory.
    pub cache: PathBuf,
    /// Data directory.
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the cctally application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("dev", "cctally", "cctally") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                cache: proj_dirs.cache_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
            Self {
                config: home.join(".config/cctally"),
                cache: home.join(".cache/cctally"),
                data: home.join(".local/share/cctally"),
            }
        }
    }

    /// All three directories under one root. Used by tests and `--data-dir` style overrides.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config: root.join("config"),
            cache: root.join("cache"),
            data: root.join("data"),
        }
    }

    /// Path to the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the pricing cache file.
    #[must_use]
    pub fn pricing_cache_file(&self) -> PathBuf {
        self.cache.join("pricing").join("model-prices-v2.json")
    }

    /// Path to history database file.
    #[must_use]
    pub fn history_db_file(&self) -> PathBuf {
        self.data.join("usage-history.sqlite")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// The user's home directory.
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Default session log root, `~/.claude/projects`.
#[must_use]
pub fn default_log_root() -> Option<PathBuf> {
    home_dir().map(|home| home.join(DEFAULT_LOG_ROOT))
}
