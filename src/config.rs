//! App directory layout and path translation.

use crate::utils;
use path_slash::PathExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The file name of the app configuration file.
pub const APP_CONFIG_FILENAME: &str = "pydgeot.json";

/// The file name of the catalog store file.
pub const CATALOG_FILENAME: &str = "pydgeot.db";

/// Per-directory configuration file name (`pydgeot.conf` at the app root).
pub const DIR_CONFIG_FILENAME: &str = ".pydgeot.conf";

/// Resolved absolute paths of an app directory.
///
/// Translates between source paths, build paths, and the forward-slash
/// relative paths the catalog stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppPaths {
    /// The app directory root.
    pub root: PathBuf,
    /// Where source content lives.
    pub source_root: PathBuf,
    /// Where generated content is written.
    pub build_root: PathBuf,
    /// Engine state directory.
    pub store_root: PathBuf,
    /// Log directory, under the store.
    pub log_root: PathBuf,
    /// Path of `pydgeot.json`.
    pub config_path: PathBuf,
    /// Path of the catalog store file.
    pub catalog_path: PathBuf,
}

impl AppPaths {
    /// Resolves the layout for the given app root.
    ///
    /// The root is canonicalized if it exists; layout paths are fixed
    /// relative to it.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = utils::canonicalized(root);
        let source_root = root.join("source");
        let build_root = root.join("build");
        let store_root = root.join("store");
        let log_root = store_root.join("log");
        let config_path = root.join(APP_CONFIG_FILENAME);
        let catalog_path = store_root.join(CATALOG_FILENAME);
        Self { root, source_root, build_root, store_root, log_root, config_path, catalog_path }
    }

    /// Whether the root directory exists and carries an app configuration.
    pub fn is_valid(&self) -> bool {
        self.root.is_dir() && self.config_path.is_file()
    }

    /// Returns the absolute source path for a source, build, or relative
    /// path.
    pub fn to_source(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.starts_with(&self.source_root) {
            return path.to_path_buf();
        }
        if let Ok(rel) = path.strip_prefix(&self.build_root) {
            return self.source_root.join(rel);
        }
        self.source_root.join(path)
    }

    /// Returns the absolute build path for a source, build, or relative path.
    pub fn to_build(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.starts_with(&self.build_root) {
            return path.to_path_buf();
        }
        if let Ok(rel) = path.strip_prefix(&self.source_root) {
            return self.build_root.join(rel);
        }
        self.build_root.join(path)
    }

    /// Returns the forward-slash path of `path` relative to whichever root
    /// prefixes it.
    ///
    /// A path equal to its root maps to the empty string. Paths that are
    /// under neither root are treated as already relative.
    pub fn to_relative(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        let rel = path
            .strip_prefix(&self.source_root)
            .or_else(|_| path.strip_prefix(&self.build_root))
            .unwrap_or(path);
        rel.to_slash_lossy().into_owned()
    }

    /// Builds a regex matching the relative paths of files in `dir`.
    ///
    /// Non-recursive matches only direct children; recursive matches all
    /// descendants. The regex is anchored and uses forward-slash separators,
    /// matching the catalog's path representation.
    pub fn path_regex(&self, dir: impl AsRef<Path>, recursive: bool) -> String {
        let rel = self.to_relative(dir);
        let pattern = if recursive { ".*" } else { "[^/]*" };
        if rel.is_empty() {
            format!("^({pattern})$")
        } else {
            format!("^{}/({pattern})$", regex::escape(&rel))
        }
    }
}

/// Deserialized contents of `pydgeot.json`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppSettings {
    /// Plugins to load, in order. `builtins.` prefixed names resolve to the
    /// built-in plugin set.
    #[serde(default)]
    pub plugins: Vec<String>,
    /// All remaining keys, available to processors and commands.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
