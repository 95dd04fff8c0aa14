//! Cache file helpers.
//!
//! # Features
//! - Atomic writes using temp file + rename (a crash never leaves a torn file)
//! - Age checks based on file modification time
//! - Graceful degradation on missing files

use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::error::Result;

/// Age of a file from its modification time.
///
/// A modification time in the future counts as age zero.
#[must_use]
pub fn get_age(path: &Path) -> Option<Duration> {
    let modified = path.metadata().and_then(|m| m.modified()).ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

/// Write raw bytes atomically, creating parent directories.
///
/// # Errors
///
/// Propagates I/O failures from directory creation, the temp write, or the rename.
pub fn write_bytes(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, content)?;
    Ok(())
}

/// Write bytes atomically using temp file + rename.
/// The temp file lives in the same directory so the rename stays on one filesystem.
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("cache"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}
