//! Filesystem watcher for the session log root.
//!
//! Any change under the root becomes a bare notification to a [`DebounceNotifier`];
//! event kinds other than reads are not distinguished and paths are ignored.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::core::debounce::DebounceNotifier;
use crate::error::{Result, TallyError};

/// Keeps the OS watcher alive; dropping it stops notifications.
pub struct LogWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for LogWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWatcher").field("root", &self.root).finish()
    }
}

impl LogWatcher {
    /// Watch `root` recursively.
    ///
    /// # Errors
    ///
    /// `LogRootNotFound` when the root is missing, `Other` when the OS watcher fails.
    pub fn start(root: &Path, notifier: DebounceNotifier) -> Result<Self> {
        if !root.is_dir() {
            return Err(TallyError::LogRootNotFound {
                path: root.display().to_string(),
            });
        }

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_change(&event.kind) => notifier.notify(),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Log watcher error"),
        })
        .map_err(|e| TallyError::Other(anyhow::anyhow!("create log watcher: {e}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| TallyError::Other(anyhow::anyhow!("watch {}: {e}", root.display())))?;

        tracing::debug!(root = %root.display(), "Watching session logs");
        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_change(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}
