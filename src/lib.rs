#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod error;

pub mod catalog;
pub use catalog::{Catalog, SourceRecord, TargetRecord};

pub mod commands;
pub use commands::Command;

mod config;
pub use config::{AppPaths, AppSettings, APP_CONFIG_FILENAME, DIR_CONFIG_FILENAME};

mod dirconfig;
pub use dirconfig::DirConfig;

pub mod generator;
pub use generator::{ChangeSet, Generator};

pub mod glob;
pub use glob::Glob;

pub mod observer;
pub use observer::Observer;

pub mod processors;
pub use processors::{Plugin, Processor, Registry};

pub mod utils;

use crate::error::{AppError, Result};
use std::{
    cell::RefCell,
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    fmt, fs,
    path::{Path, PathBuf},
    rc::Rc,
};

/// An app directory and everything loaded for it: settings, the catalog, the
/// active processors, and the command set.
///
/// Content lives under `source/`, generated output under `build/`, and engine
/// state (catalog, logs) under `store/`. The directory is valid once it
/// carries a `pydgeot.json`.
pub struct App {
    paths: AppPaths,
    settings: AppSettings,
    catalog: Catalog,
    registry: Registry,
    processors: Vec<Box<dyn Processor>>,
    commands: BTreeMap<&'static str, Command>,
    dir_configs: RefCell<HashMap<PathBuf, Rc<DirConfig>>>,
}

impl App {
    /// Opens the app at the given root with the built-in plugin registry.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(root, Registry::builtin())
    }

    /// Opens the app at the given root with an explicit plugin registry.
    ///
    /// Fails with [`AppError::InvalidAppRoot`] unless the root exists and
    /// carries a `pydgeot.json`, and with [`AppError::Config`] when the
    /// settings are malformed or name an unknown plugin.
    pub fn open_with(root: impl AsRef<Path>, registry: Registry) -> Result<Self> {
        let paths = AppPaths::new(root.as_ref());
        if !paths.is_valid() {
            return Err(AppError::InvalidAppRoot(paths.root));
        }

        let settings: AppSettings = utils::read_json_file(&paths.config_path)?;

        fs::create_dir_all(&paths.source_root)
            .map_err(|err| AppError::io(err, &paths.source_root))?;
        fs::create_dir_all(&paths.log_root).map_err(|err| AppError::io(err, &paths.log_root))?;

        let catalog = Catalog::open(paths.clone())?;

        let mut commands: BTreeMap<&'static str, Command> =
            commands::builtins().into_iter().map(|c| (c.name, c)).collect();
        let mut processors: Vec<Box<dyn Processor>> = Vec::new();
        for name in &settings.plugins {
            let plugin = registry.get(name).ok_or_else(|| {
                AppError::config(&paths.config_path, format!("unable to load plugin '{name}'"))
            })?;
            processors.extend(plugin.processors());
            for command in plugin.commands() {
                commands.insert(command.name, command);
            }
        }
        processors.sort_by_key(|p| Reverse(p.priority()));

        debug!(
            "opened app at \"{}\" with {} processors",
            paths.root.display(),
            processors.len()
        );

        Ok(Self {
            paths,
            settings,
            catalog,
            registry,
            processors,
            commands,
            dir_configs: RefCell::new(HashMap::new()),
        })
    }

    /// Creates a new app directory structure and opens it.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let paths = AppPaths::new(root.as_ref());
        for dir in [
            &paths.root,
            &paths.source_root,
            &paths.store_root,
            &paths.log_root,
            &paths.build_root,
        ] {
            fs::create_dir_all(dir).map_err(|err| AppError::io(err, dir))?;
        }
        fs::write(&paths.config_path, "{}\n")
            .map_err(|err| AppError::io(err, &paths.config_path))?;
        Self::open(&paths.root)
    }

    /// The resolved app directory layout.
    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// The deserialized `pydgeot.json`.
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// The catalog backing this app.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Active processors, sorted by descending priority.
    pub fn processors(&self) -> &[Box<dyn Processor>] {
        &self.processors
    }

    /// The plugin registry this app was constructed with.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Plugin names enabled by the settings.
    pub fn enabled_plugins(&self) -> &[String] {
        &self.settings.plugins
    }

    /// All available commands, sorted by name.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Resolved per-directory configuration, cached per directory.
    pub fn dir_config(&self, dir: &Path) -> Result<Rc<DirConfig>> {
        if let Some(config) = self.dir_configs.borrow().get(dir) {
            return Ok(config.clone());
        }
        let config = Rc::new(DirConfig::load(self, dir)?);
        self.dir_configs.borrow_mut().insert(dir.to_path_buf(), config.clone());
        Ok(config)
    }

    /// Selects the processor responsible for a path.
    ///
    /// Processors enabled for the path's directory are consulted in
    /// descending priority order; the contenders are the claimants of the
    /// highest priority tier with any claimant, so a lowest-priority
    /// catch-all fallback only applies when nothing else wants the path.
    /// When several tie, only those whose `negotiate` returns `true` stay in
    /// the running; more than one survivor is an error, none means the path
    /// is skipped.
    pub fn get_processor(&self, path: &Path) -> Result<Option<&dyn Processor>> {
        let dir = path.parent().unwrap_or(&self.paths.source_root);
        let config = self.dir_config(dir)?;

        let enabled = self.processors.iter().map(|p| &**p).filter(|p| {
            config
                .processors
                .as_ref()
                .map_or(true, |names| names.iter().any(|name| name == p.name()))
        });
        let mut contenders: Vec<&dyn Processor> = Vec::new();
        for processor in enabled {
            if let Some(claimed) = contenders.first() {
                if processor.priority() != claimed.priority() {
                    break;
                }
            }
            if processor.can_process(self, path) {
                contenders.push(processor);
            }
        }

        match contenders.len() {
            0 => Ok(None),
            1 => Ok(Some(contenders[0])),
            _ => {
                let survivors: Vec<&dyn Processor> = contenders
                    .iter()
                    .copied()
                    .filter(|p| p.negotiate(self, path, &contenders))
                    .collect();
                match survivors.len() {
                    0 => Ok(None),
                    1 => Ok(Some(survivors[0])),
                    _ => Err(AppError::AmbiguousProcessor(self.paths.to_relative(path))),
                }
            }
        }
    }

    /// Dispatches a phase to the path's processor, recovering from failures.
    ///
    /// One bad file never aborts a cycle: dispatch and processor errors are
    /// logged with the relative path and processor name, and the path is
    /// skipped.
    fn processor_call<F>(&self, phase: &str, path: &Path, log_call: bool, call: F) -> bool
    where
        F: FnOnce(&dyn Processor) -> Result<()>,
    {
        let rel = self.paths.to_relative(path);
        let processor = match self.get_processor(path) {
            Ok(Some(processor)) => processor,
            Ok(None) => {
                trace!("no processor for '{rel}'");
                return false;
            }
            Err(err) => {
                warn!("could not dispatch '{rel}' {phase}: {err}");
                return false;
            }
        };
        let name = processor.name();
        match call(processor) {
            Ok(()) => {
                if log_call {
                    info!("processed '{rel}' {phase} with {name}");
                }
                true
            }
            Err(err) => {
                error!("error processing '{rel}' {phase} with {name}: {err}");
                false
            }
        }
    }

    /// Processes a prepare event for the given path. Returns whether a
    /// processor ran successfully.
    pub fn processor_prepare(&self, path: &Path) -> bool {
        self.processor_call("prepare", path, false, |p| p.prepare(self, path))
    }

    /// Processes a generate event for the given path. Returns whether a
    /// processor ran successfully.
    pub fn processor_generate(&self, path: &Path) -> bool {
        self.processor_call("generate", path, true, |p| p.generate(self, path))
    }

    /// Processes a delete event for the given path. Returns whether a
    /// processor ran successfully.
    pub fn processor_delete(&self, path: &Path) -> bool {
        self.processor_call("delete", path, true, |p| p.delete(self, path))
    }

    /// Signals the end of a build cycle to every processor, in priority
    /// order.
    pub fn processor_generation_complete(&self) {
        for processor in &self.processors {
            if let Err(err) = processor.generation_complete(self) {
                error!("error completing generation with {}: {err}", processor.name());
            }
        }
    }

    /// Deletes all built content and empties the catalog. The next build
    /// regenerates everything.
    pub fn reset(&mut self) -> Result<()> {
        for processor in &self.processors {
            if let Err(err) = processor.reset(self) {
                error!("error resetting {}: {err}", processor.name());
            }
        }
        if self.paths.build_root.is_dir() {
            fs::remove_dir_all(&self.paths.build_root)
                .map_err(|err| AppError::io(err, &self.paths.build_root))?;
        }
        self.catalog.wipe()?;
        self.catalog.commit()?;
        Ok(())
    }

    /// Processes delete events for every file under the given directories
    /// without touching the source files, so they rebuild fresh on the next
    /// cycle. `None` cleans the whole source tree.
    pub fn clean(&self, paths: Option<&[PathBuf]>) -> Result<()> {
        let dirs: Vec<PathBuf> = match paths {
            None => vec![self.paths.source_root.clone()],
            Some(paths) => paths.iter().map(|p| self.paths.to_source(p)).collect(),
        };
        for dir in &dirs {
            if dir.is_dir() {
                for file in utils::source_files_iter(dir) {
                    self.processor_delete(&file);
                }
            }
        }
        self.processor_generation_complete();
        self.catalog.clean(&dirs)?;
        self.catalog.commit()?;
        Ok(())
    }

    /// Runs a command by name.
    pub fn run_command(&mut self, name: &str, args: &[String]) -> Result<()> {
        let Some(command) = self.commands.get(name).copied() else {
            return Err(AppError::UnknownCommand(name.to_string()));
        };
        debug!("running command '{name}'");
        (command.run)(self, args)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("root", &self.paths.root)
            .field("plugins", &self.settings.plugins)
            .field("processors", &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Installs the global tracing subscriber: terse output on the console plus a
/// persistent `app.log` under the given directory.
///
/// Intended for the CLI front-end; the library itself never touches the
/// global subscriber. Returns the guard flushing the log file writer.
pub fn init_logging(log_root: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt};

    fs::create_dir_all(log_root).map_err(|err| AppError::io(err, log_root))?;
    let file = tracing_appender::rolling::never(log_root, "app.log");
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(subscriber_fmt::layer().with_target(false).with_ansi(false).without_time())
        .with(subscriber_fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
        .try_init()
        .ok();

    Ok(guard)
}
