//! Per-directory cascading configuration.
//!
//! Every source directory may carry a `.pydgeot.conf` (`pydgeot.conf` at the
//! app root) JSON object. Settings cascade from the app root down:
//! list-valued keys are replaced entirely when a child defines them,
//! object-valued keys are deep merged with the child winning on scalar
//! conflicts, and a `!` suffix on any key forces replace-over-merge at that
//! level.

use crate::{
    config::DIR_CONFIG_FILENAME,
    error::{AppError, Result},
    glob::Glob,
    utils, App,
};
use serde_json::{Map, Value};
use std::path::Path;

/// Resolved configuration for one source directory.
#[derive(Debug, Clone)]
pub struct DirConfig {
    /// Processor names enabled in this subtree. `None` inherits the full
    /// loaded set.
    pub processors: Option<Vec<String>>,
    /// Globs applied to source-relative paths; matching files are skipped by
    /// the generator.
    pub ignore: Vec<Glob>,
    /// All remaining keys, merged with the parent config.
    pub extra: Map<String, Value>,
}

impl DirConfig {
    /// Loads and resolves the configuration for `dir`, inheriting from its
    /// parent chain up to the app root.
    pub(crate) fn load(app: &App, dir: &Path) -> Result<Self> {
        let root = &app.paths().root;
        let file = if dir == root {
            dir.join(DIR_CONFIG_FILENAME.trim_start_matches('.'))
        } else {
            dir.join(DIR_CONFIG_FILENAME)
        };

        let mut config: Map<String, Value> = if file.is_file() {
            utils::read_json_file(&file)?
        } else {
            Map::new()
        };

        let parent = if dir != root && dir.starts_with(root) {
            match dir.parent() {
                Some(parent) => Some(app.dir_config(parent)?),
                None => None,
            }
        } else {
            None
        };

        let processors = match take_key(&mut config, "processors") {
            Some(value) => {
                let names = string_list(&file, "processors", value)?;
                for name in &names {
                    if !app.processors().iter().any(|p| p.name() == name) {
                        return Err(AppError::config(
                            &file,
                            format!("unable to find processor: '{name}'"),
                        ));
                    }
                }
                Some(names)
            }
            None => parent.as_ref().and_then(|p| p.processors.clone()),
        };

        let ignore = match take_key(&mut config, "ignore") {
            Some(value) => {
                let mut globs = Vec::new();
                for glob in string_list(&file, "ignore", value)? {
                    let glob = if dir != root && dir != app.paths().source_root {
                        format!("{}/{}", app.paths().to_relative(dir), glob)
                    } else {
                        glob
                    };
                    globs.push(
                        Glob::new(&glob).map_err(|err| AppError::config(&file, err))?,
                    );
                }
                globs
            }
            None => parent.as_ref().map(|p| p.ignore.clone()).unwrap_or_default(),
        };

        let mut extra = parent.as_ref().map(|p| p.extra.clone()).unwrap_or_default();
        merge_map(&mut extra, config);

        Ok(Self { processors, ignore, extra })
    }

    /// Whether the source-relative path is matched by an ignore glob.
    pub fn is_ignored(&self, relative: &str) -> bool {
        self.ignore.iter().any(|glob| glob.matches(relative))
    }
}

/// Removes `key` from the map, also accepting the `!`-suffixed spelling.
fn take_key(config: &mut Map<String, Value>, key: &str) -> Option<Value> {
    config.remove(key).or_else(|| config.remove(&format!("{key}!")))
}

fn string_list(file: &Path, key: &str, value: Value) -> Result<Vec<String>> {
    let invalid = || AppError::config(file, format!("'{key}' must be a list of strings"));
    let Value::Array(items) = value else { return Err(invalid()) };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => Err(invalid()),
        })
        .collect()
}

/// Merges `source` into `target`. Objects merge recursively, any other value
/// replaces, and a `!` key suffix forces replacement at that level.
fn merge_map(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if let Some(key) = key.strip_suffix('!') {
            target.insert(key.to_string(), value);
            continue;
        }
        match value {
            Value::Object(incoming) => {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    merge_map(existing, incoming);
                } else {
                    target.insert(key, Value::Object(incoming));
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}
