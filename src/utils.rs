//! Utility functions

use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use std::{
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::WalkDir;

/// Returns an iterator that yields all files under the given root path, or the
/// `root` itself if it is a file.
///
/// This also follows symlinks.
pub fn source_files_iter(root: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().into())
}

/// Returns the same path config but with canonicalized paths.
///
/// This uses [`dunce`] to resolve the path without UNC prefixes on Windows.
/// Non-existing paths are returned unchanged, lexically cleaned.
pub fn canonicalized(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    dunce::canonicalize(&path).unwrap_or(path)
}

/// Reads the size and modified time (unix seconds) of the file's metadata.
///
/// Returns `(0, 0)` if the file does not exist.
pub fn file_stat(path: &Path) -> (u64, i64) {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta
                .modified()
                .ok()
                .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();
            (meta.len(), modified)
        }
        Err(_) => (0, 0),
    }
}

/// Deserializes the json file at the given path.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|err| AppError::io(err, path))?;
    serde_json::from_str(&content).map_err(|err| AppError::config(path, err))
}

/// Creates the parent directory of the `file` and all its ancestors.
pub fn create_parent_dir_all(file: impl AsRef<Path>) -> Result<()> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|err| AppError::io(err, parent))?;
    }
    Ok(())
}

/// Removes `dir` if it exists and contains no entries.
pub fn remove_dir_if_empty(dir: &Path) {
    if let Ok(mut entries) = fs::read_dir(dir) {
        if entries.next().is_none() {
            let _ = fs::remove_dir(dir);
        }
    }
}
