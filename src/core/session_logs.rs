//! Session log discovery.
//!
//! The log root holds one directory per project and one `.jsonl` file per session.
//! A session `S` in project `P` may also have sub-agent logs under
//! `P/S/subagents/**.jsonl`; those count toward the session but are never a
//! session of their own.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::models::ActiveSession;
use crate::error::{Result, TallyError};
use crate::storage::paths;

/// Directory name that marks sub-agent logs.
pub const SUBAGENT_DIR: &str = "subagents";

/// Discovered session log file with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLogPath {
    pub path: PathBuf,
    /// Name of the directory holding the file.
    pub parent_dir: String,
    pub session_id: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub is_subagent: bool,
}

impl SessionLogPath {
    fn new(root: &Path, path: PathBuf) -> Self {
        let session_id = session_id_from_path(&path);
        let modified_at = file_modified_at(&path);
        let parent_dir = parent_dir_name(&path);
        let is_subagent = is_under_subagent_dir(root, &path);
        Self {
            path,
            parent_dir,
            session_id,
            modified_at,
            is_subagent,
        }
    }
}

/// Session log discovery under one log root.
#[derive(Debug, Clone)]
pub struct SessionLogFinder {
    root: PathBuf,
}

impl SessionLogFinder {
    /// Create a new finder rooted at `~/.claude/projects`.
    ///
    /// # Errors
    ///
    /// `HomeDirUnavailable` when the home directory cannot be resolved.
    pub fn new() -> Result<Self> {
        let root = paths::default_log_root().ok_or(TallyError::HomeDirUnavailable)?;
        Ok(Self { root })
    }

    /// Create a finder with an explicit root (config overrides, tests).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn root_exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Every log file under the root, sub-agent files included, most recent first.
    #[must_use]
    pub fn all_logs(&self) -> Vec<SessionLogPath> {
        let mut logs: Vec<SessionLogPath> = collect_jsonl_files(&self.root)
            .into_iter()
            .map(|path| SessionLogPath::new(&self.root, path))
            .collect();
        sort_logs_by_mtime(&mut logs);
        logs
    }

    /// Session files only (no sub-agent files), most recent first.
    #[must_use]
    pub fn session_logs(&self) -> Vec<SessionLogPath> {
        self.all_logs()
            .into_iter()
            .filter(|log| !log.is_subagent)
            .collect()
    }

    /// The session file modified most recently.
    #[must_use]
    pub fn latest_session(&self) -> Option<SessionLogPath> {
        self.session_logs().into_iter().next()
    }

    /// Metadata for an explicit file path.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` when the file does not exist.
    pub fn session_at(&self, path: &Path) -> Result<SessionLogPath> {
        if !path.is_file() {
            return Err(TallyError::SessionNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(SessionLogPath::new(&self.root, path.to_path_buf()))
    }

    /// Every file, sub-agent files included, modified at or after `since`.
    ///
    /// Sorted by path so repeated passes read files in the same order.
    #[must_use]
    pub fn modified_since(&self, since: DateTime<Utc>) -> Vec<SessionLogPath> {
        let mut logs: Vec<SessionLogPath> = self
            .all_logs()
            .into_iter()
            .filter(|log| log.modified_at.is_some_and(|m| m >= since))
            .collect();
        logs.sort_by(|a, b| a.path.cmp(&b.path));
        logs
    }

    /// Sub-agent files belonging to a session file, sorted by path.
    #[must_use]
    pub fn subagent_logs(&self, session_file: &Path) -> Vec<SessionLogPath> {
        let Some(dir) = subagent_dir_for(session_file) else {
            return Vec::new();
        };
        let mut files = collect_jsonl_files(&dir);
        files.sort();
        files
            .into_iter()
            .map(|path| SessionLogPath::new(&self.root, path))
            .collect()
    }

    /// Sub-agent files modified within `recency`, most recent first.
    #[must_use]
    pub fn recent_subagent_logs(&self, session_file: &Path, recency: Duration) -> Vec<SessionLogPath> {
        let cutoff = cutoff(recency);
        let mut logs: Vec<SessionLogPath> = self
            .subagent_logs(session_file)
            .into_iter()
            .filter(|log| log.modified_at.is_some_and(|m| m >= cutoff))
            .collect();
        sort_logs_by_mtime(&mut logs);
        logs
    }

    /// The newest session of every project written within `threshold`.
    ///
    /// When no project qualifies, the single newest session is returned instead so
    /// callers always have something to show. Most recent first.
    #[must_use]
    pub fn active_sessions(&self, threshold: Duration) -> Vec<ActiveSession> {
        let logs = self.session_logs();
        let cutoff = cutoff(threshold);

        // `logs` is newest first, so the first file seen per directory is its newest.
        let mut newest_per_dir: HashMap<PathBuf, &SessionLogPath> = HashMap::new();
        for log in &logs {
            let dir = log.path.parent().map(Path::to_path_buf).unwrap_or_default();
            newest_per_dir.entry(dir).or_insert(log);
        }

        let mut active: Vec<&SessionLogPath> = newest_per_dir
            .into_values()
            .filter(|log| log.modified_at.is_some_and(|m| m >= cutoff))
            .collect();

        if active.is_empty() {
            active.extend(logs.first());
        }

        let mut sessions: Vec<ActiveSession> = active.into_iter().map(to_active_session).collect();
        sessions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| a.path.cmp(&b.path)));
        sessions
    }
}

fn to_active_session(log: &SessionLogPath) -> ActiveSession {
    ActiveSession {
        path: log.path.clone(),
        parent_dir: log.parent_dir.clone(),
        project_label: project_label(&log.path, &log.parent_dir),
        modified_at: log.modified_at.unwrap_or_else(Utc::now),
    }
}

fn cutoff(window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| Utc::now().checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Human-readable project name for a session file.
///
/// Prefers the last component of the first `cwd` recorded in the log; otherwise
/// takes the text after the last `-` of the encoded project directory name.
#[must_use]
pub fn project_label(path: &Path, parent_dir: &str) -> String {
    if let Some(cwd) = first_recorded_cwd(path) {
        if let Some(name) = Path::new(&cwd).file_name().and_then(|n| n.to_str()) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    label_from_dir_name(parent_dir)
}

fn label_from_dir_name(dir_name: &str) -> String {
    match dir_name.rsplit_once('-') {
        Some((_, tail)) if !tail.is_empty() => tail.to_string(),
        _ => dir_name.to_string(),
    }
}

fn first_recorded_cwd(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    BufReader::new(file)
        .split(b'\n')
        .map_while(std::result::Result::ok)
        .filter_map(|line| serde_json::from_slice::<Value>(&line).ok())
        .find_map(|value| {
            value
                .get("cwd")
                .and_then(Value::as_str)
                .filter(|cwd| !cwd.is_empty())
                .map(str::to_string)
        })
}

/// `P/S.jsonl` -> `P/S/subagents`.
fn subagent_dir_for(session_file: &Path) -> Option<PathBuf> {
    let parent = session_file.parent()?;
    let stem = session_file.file_stem()?;
    Some(parent.join(stem).join(SUBAGENT_DIR))
}

fn is_under_subagent_dir(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .parent()
        .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == SUBAGENT_DIR))
}

fn is_jsonl_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

pub(crate) fn collect_jsonl_files(root: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_jsonl_file(&path) {
                results.push(path);
            }
        }
    }

    results
}

/// File stem, used as the session id until a log line says otherwise.
#[must_use]
pub fn session_id_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map_or_else(|| "unknown".to_string(), str::to_string)
}

fn parent_dir_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Modification time of a file.
#[must_use]
pub fn file_modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn sort_logs_by_mtime(entries: &mut [SessionLogPath]) {
    entries.sort_by(|a, b| {
        let by_time = b.modified_at.cmp(&a.modified_at);
        if by_time == std::cmp::Ordering::Equal {
            a.path.cmp(&b.path)
        } else {
            by_time
        }
    });
}
