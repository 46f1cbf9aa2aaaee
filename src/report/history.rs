//! Carry Allure trend data from the rendered report back into raw results
//!
//! Allure reads `<results>/history` when generating and writes the merged
//! trend data to `<report>/history`. Copying it back after each generation
//! keeps the trend graphs growing across runs.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const HISTORY_DIR: &str = "history";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Create `<dir>/history` unless it exists
pub fn ensure_history_dir(dir: &Path) -> Result<PathBuf, HistoryError> {
    let path = dir.join(HISTORY_DIR);
    if !path.is_dir() {
        std::fs::create_dir_all(&path).map_err(|source| HistoryError::CreateDir {
            path: path.clone(),
            source,
        })?;
    }
    Ok(path)
}

/// Recursively copy `from` into `to`, overwriting existing files.
/// A missing `from` copies nothing. Returns the number of files copied.
pub fn copy_history(from: &Path, to: &Path) -> Result<usize, HistoryError> {
    if !from.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|source| HistoryError::Walk {
            path: from.to_path_buf(),
            source,
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|source| HistoryError::CreateDir {
                path: target.clone(),
                source,
            })?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| HistoryError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::copy(entry.path(), &target).map_err(|source| HistoryError::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source,
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Seed `<results>/history` from `<report>/history`.
///
/// Both history directories are created if absent before copying.
pub fn propagate_history(report_dir: &Path, results_dir: &Path) -> Result<usize, HistoryError> {
    let report_history = ensure_history_dir(report_dir)?;
    let results_history = ensure_history_dir(results_dir)?;
    copy_history(&report_history, &results_history)
}
