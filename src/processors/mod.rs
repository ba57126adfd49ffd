//! Processor contract and the static plugin registry.
//!
//! When generating content, the [`App`](crate::App) asks every registered
//! processor whether it can handle a path, in descending priority order. The
//! selected processor prepares the source (declaring targets, dependencies,
//! and context vars, without writing output), and later generates it. A
//! lowest-priority fallback typically accepts everything and copies or
//! symlinks.

mod copy;
mod symlink;

pub use copy::CopyFallbackProcessor;
pub use symlink::SymlinkFallbackProcessor;

use crate::{commands::Command, error::Result, utils, App};
use std::{fs, path::Path};

/// Default dispatch priority. Higher priorities are checked earlier.
pub const DEFAULT_PRIORITY: i32 = 50;

/// A content processor.
///
/// All methods other than [`can_process`](Processor::can_process) carry empty
/// default implementations, so a processor only implements the phases it
/// participates in.
pub trait Processor {
    /// Display name for config and logging.
    fn name(&self) -> &'static str;

    /// Dispatch priority; processors with higher values are checked earlier.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Whether this processor is able to process the given source path.
    fn can_process(&self, app: &App, path: &Path) -> bool;

    /// Tiebreaker consulted when more than one processor claims a path.
    ///
    /// Only contenders returning `true` stay in the running; exactly one must
    /// remain or dispatch fails for the path.
    fn negotiate(&self, _app: &App, _path: &Path, _contenders: &[&dyn Processor]) -> bool {
        false
    }

    /// Preprocesses a source file: sets targets, dependencies, and context
    /// vars. Must not write to the build tree.
    fn prepare(&self, _app: &App, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Generates content for a prepared source file. Called after all
    /// preparation for the cycle is complete.
    fn generate(&self, _app: &App, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Processes a deleted source file.
    ///
    /// The default implementation unlinks each target this source was the
    /// last owner of, prunes target directories left empty, removes the
    /// context vars the source published, and removes the source row.
    fn delete(&self, app: &App, path: &Path) -> Result<()> {
        let catalog = app.catalog();
        for target in catalog.get_targets(path)? {
            let owners = catalog.get_target_sources(&target.path)?;
            if owners.len() <= 1 && (target.path.is_file() || target.path.is_symlink()) {
                if fs::remove_file(&target.path).is_ok() {
                    if let Some(parent) = target.path.parent() {
                        utils::remove_dir_if_empty(parent);
                    }
                }
            }
        }
        catalog.remove_context_vars(Some(path), None)?;
        catalog.remove_source(path)?;
        Ok(())
    }

    /// Called once per build cycle after all generate calls.
    fn generation_complete(&self, _app: &App) -> Result<()> {
        Ok(())
    }

    /// Called when the app is reset.
    fn reset(&self, _app: &App) -> Result<()> {
        Ok(())
    }
}

/// A named bundle of processors and commands.
///
/// Plugins are linked in and published through a [`Registry`] handed to the
/// app at construction; `pydgeot.json` selects which ones are active.
pub trait Plugin {
    /// Name the `plugins` config list refers to. Built-ins are addressed with
    /// a `builtins.` prefix.
    fn name(&self) -> &'static str;

    /// Processors this plugin contributes.
    fn processors(&self) -> Vec<Box<dyn Processor>> {
        Vec::new()
    }

    /// Commands this plugin contributes.
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }
}

/// Process-wide set of available plugins.
pub struct Registry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Registry {
    /// An empty registry with no plugins.
    pub fn empty() -> Self {
        Self { plugins: Vec::new() }
    }

    /// The registry of built-in plugins.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(copy::CopyFallbackPlugin));
        registry.register(Box::new(symlink::SymlinkFallbackPlugin));
        registry
    }

    /// Adds a plugin to the registry.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Looks a plugin up by its config name, resolving the `builtins.`
    /// prefix.
    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        let name = name.strip_prefix("builtins.").unwrap_or(name);
        self.plugins.iter().find(|p| p.name() == name).map(|p| &**p)
    }

    /// Names of all registered plugins.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("plugins", &self.names()).finish()
    }
}
