//! Change collection and the two-phase incremental build.
//!
//! A build cycle walks the source tree, diffs it against the catalog's prior
//! state into a [`ChangeSet`], expands the set with the reverse transitive
//! closure of structural and context-var dependencies, prepares every
//! affected source, and only then generates. Preparing everything first means
//! all context vars are published before any file that might query them is
//! rendered.

use crate::{
    config::DIR_CONFIG_FILENAME,
    error::{AppError, Result},
    App,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// Modified-time slack, in seconds. Deltas at or below this are not changes.
const MTIME_TOLERANCE: i64 = 1;

/// Paths that need generating or deleting, as absolute source paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub generate: BTreeSet<PathBuf>,
    pub delete: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.generate.is_empty() && self.delete.is_empty()
    }

    /// Merges another change set in.
    pub fn merge(&mut self, other: ChangeSet) {
        self.generate.extend(other.generate);
        self.delete.extend(other.delete);
    }
}

/// Drives incremental builds for an [`App`].
#[derive(Debug)]
pub struct Generator<'a> {
    app: &'a App,
}

impl<'a> Generator<'a> {
    pub fn new(app: &'a App) -> Self {
        Self { app }
    }

    /// Runs a full build cycle: collect changes under the source root and
    /// process them.
    pub fn generate(&self) -> Result<()> {
        let build_root = &self.app.paths().build_root;
        fs::create_dir_all(build_root).map_err(|err| AppError::io(err, build_root))?;
        let changes = self.collect_changes()?;
        self.process_changes(changes)
    }

    /// Collects changes for the whole source tree.
    pub fn collect_changes(&self) -> Result<ChangeSet> {
        let root = self.app.paths().source_root.clone();
        self.collect_changes_in(&root)
    }

    /// Diffs the directory against the catalog's prior state.
    ///
    /// New files and files whose modified time advanced past the tolerance go
    /// to `generate`; files the catalog knows but the directory no longer
    /// contains go to `delete`. Subdirectories are collected recursively and
    /// merged. Ignored files and per-directory config files are skipped
    /// entirely.
    pub fn collect_changes_in(&self, root: &Path) -> Result<ChangeSet> {
        let app = self.app;
        let mut changes = ChangeSet::default();

        let prior: BTreeMap<String, i64> = app
            .catalog()
            .get_sources(root, false)?
            .into_iter()
            .map(|record| (app.paths().to_relative(&record.path), record.modified))
            .collect();

        let mut current: BTreeMap<String, (PathBuf, i64)> = BTreeMap::new();
        let mut subdirs: Vec<PathBuf> = Vec::new();

        if root.is_dir() {
            let config = app.dir_config(root)?;
            let entries = fs::read_dir(root).map_err(|err| AppError::io(err, root))?;
            for entry in entries {
                let entry = entry.map_err(|err| AppError::io(err, root))?;
                let path = entry.path();
                if path.is_dir() {
                    subdirs.push(path);
                    continue;
                }
                if path.file_name().and_then(|n| n.to_str()) == Some(DIR_CONFIG_FILENAME) {
                    continue;
                }
                let rel = app.paths().to_relative(&path);
                if config.is_ignored(&rel) {
                    trace!("ignoring '{rel}'");
                    continue;
                }
                let (_, modified) = crate::utils::file_stat(&path);
                current.insert(rel, (path, modified));
            }
        }

        for (rel, (path, modified)) in &current {
            match prior.get(rel) {
                None => {
                    changes.generate.insert(path.clone());
                }
                Some(prior_modified) if modified - prior_modified > MTIME_TOLERANCE => {
                    changes.generate.insert(path.clone());
                }
                Some(_) => {}
            }
        }

        for rel in prior.keys() {
            if !current.contains_key(rel) {
                changes.delete.insert(app.paths().to_source(rel));
            }
        }

        for dir in subdirs {
            changes.merge(self.collect_changes_in(&dir)?);
        }

        Ok(changes)
    }

    /// Processes a change set through the delete, prepare, and generate
    /// phases, then commits the catalog.
    ///
    /// Processor failures are recovered per path by the dispatcher; a store
    /// failure aborts the cycle and rolls the catalog back.
    pub fn process_changes(&self, changes: ChangeSet) -> Result<()> {
        match self.try_process_changes(changes) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Err(rollback_err) = self.app.catalog().rollback() {
                    warn!("rollback after failed cycle also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    fn try_process_changes(&self, changes: ChangeSet) -> Result<()> {
        let app = self.app;
        let catalog = app.catalog();
        debug!(
            "processing changes: {} to generate, {} to delete",
            changes.generate.len(),
            changes.delete.len()
        );

        // A deleted source may still have dependents and context consumers;
        // their closures must be read before the delete cascades the rows
        // away.
        let mut dep_changes: BTreeSet<PathBuf> = BTreeSet::new();
        for path in &changes.delete {
            let mut affected = reverse_structural_closure(app, path)?;
            let consumers = reverse_context_closure(app, path)?;
            for consumer in &consumers {
                affected.extend(reverse_structural_closure(app, consumer)?);
            }
            affected.extend(consumers);
            dep_changes
                .extend(affected.into_iter().filter(|dependent| !changes.delete.contains(dependent)));
            app.processor_delete(path);
        }

        // Snapshot each changed file's reverse closure both before and after
        // its prepare runs. Preparing may drop a dependency edge that the old
        // closure still needs, and may add edges the old closure lacked.
        for path in &changes.generate {
            let mut structural = reverse_structural_closure(app, path)?;
            let mut consumers = reverse_context_closure(app, path)?;

            if app.processor_prepare(path) {
                catalog.add_source(path)?;
            }

            structural.extend(reverse_structural_closure(app, path)?);
            consumers.extend(reverse_context_closure(app, path)?);

            // Anything that structurally depends on a context consumer is
            // stale as well once the consumer regenerates.
            for consumer in &consumers {
                structural.extend(reverse_structural_closure(app, consumer)?);
            }

            dep_changes.extend(structural);
            dep_changes.extend(consumers);
        }

        for path in dep_changes.difference(&changes.generate) {
            app.processor_prepare(path);
        }

        for path in changes.generate.union(&dep_changes) {
            app.processor_generate(path);
        }

        app.processor_generation_complete();
        catalog.commit()?;
        Ok(())
    }
}

fn reverse_structural_closure(app: &App, path: &Path) -> Result<BTreeSet<PathBuf>> {
    Ok(app
        .catalog()
        .get_dependencies(path, true, true)?
        .into_iter()
        .map(|record| record.path)
        .collect())
}

fn reverse_context_closure(app: &App, path: &Path) -> Result<BTreeSet<PathBuf>> {
    Ok(app
        .catalog()
        .get_context_var_dep_sources(path, true, true)?
        .into_iter()
        .map(|record| record.path)
        .collect())
}
