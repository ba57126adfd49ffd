//! Persistent catalog of sources, targets, dependencies, and context vars.
//!
//! The catalog is a single relational store under `store/`. It remembers each
//! source's `(size, modified)` pair, the targets it generated, the other
//! sources it reads (structural dependencies), and the named context
//! variables it publishes or demands. All mutations run inside one
//! transaction per build cycle; [`Catalog::commit`] is called exactly once at
//! the end of a successful cycle.

mod contexts;
mod sources;

use crate::{config::AppPaths, error::Result};
use regex::RegexBuilder;
use rusqlite::{functions::FunctionFlags, Connection};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A catalog row describing a source file.
///
/// The path is absolute, under the source root. `modified` is unix seconds.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: i64,
}

/// A catalog row describing a generated target file.
///
/// The path is absolute, under the build root.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TargetRecord {
    pub path: PathBuf,
}

/// Handle to the on-disk relational store.
///
/// Not thread safe; the build pipeline uses it from a single thread.
#[derive(Debug)]
pub struct Catalog {
    conn: Connection,
    paths: AppPaths,
}

impl Catalog {
    /// Opens (or creates) the store for the given app layout and leaves the
    /// connection inside an open transaction.
    pub fn open(paths: AppPaths) -> Result<Self> {
        fs::create_dir_all(&paths.store_root)
            .map_err(|err| crate::error::AppError::io(err, &paths.store_root))?;
        let conn = Connection::open(&paths.catalog_path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Self::register_regexp(&conn)?;
        Self::create_schema(&conn)?;
        conn.execute_batch("BEGIN")?;
        trace!("opened catalog at \"{}\"", paths.catalog_path.display());
        Ok(Self { conn, paths })
    }

    /// Registers the case-insensitive `REGEXP` function used by directory
    /// scoped queries.
    fn register_regexp(conn: &Connection) -> Result<()> {
        conn.create_scalar_function(
            "regexp",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
                let pattern: Arc<regex::Regex> = ctx.get_or_create_aux(
                    0,
                    |vr| -> std::result::Result<regex::Regex, BoxError> {
                        Ok(RegexBuilder::new(vr.as_str()?).case_insensitive(true).build()?)
                    },
                )?;
                let item = ctx
                    .get_raw(1)
                    .as_str()
                    .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                Ok(pattern.is_match(item))
            },
        )?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sources (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 path TEXT NOT NULL,
                 size INTEGER NOT NULL,
                 modified INTEGER NOT NULL,
                 UNIQUE(path));
             CREATE TABLE IF NOT EXISTS source_targets (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 source_id INTEGER NOT NULL,
                 path TEXT NOT NULL,
                 FOREIGN KEY(source_id) REFERENCES sources(id)
                     ON DELETE CASCADE
                     ON UPDATE CASCADE);
             CREATE TABLE IF NOT EXISTS source_dependencies (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 source_id INTEGER NOT NULL,
                 dependency_id INTEGER NOT NULL,
                 FOREIGN KEY(source_id) REFERENCES sources(id)
                     ON DELETE CASCADE
                     ON UPDATE CASCADE,
                 FOREIGN KEY(dependency_id) REFERENCES sources(id)
                     ON DELETE CASCADE
                     ON UPDATE CASCADE);
             CREATE TABLE IF NOT EXISTS context_vars (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL,
                 value TEXT,
                 source_id INTEGER NOT NULL,
                 FOREIGN KEY(source_id) REFERENCES sources(id)
                     ON DELETE CASCADE
                     ON UPDATE CASCADE);
             -- Keyed by name rather than producer id; the variable may not
             -- be set yet when the dependency is declared.
             CREATE TABLE IF NOT EXISTS context_var_dependencies (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL,
                 dependency_id INTEGER NOT NULL,
                 FOREIGN KEY(dependency_id) REFERENCES sources(id)
                     ON DELETE CASCADE
                     ON UPDATE CASCADE);",
        )?;
        Ok(())
    }

    /// The app layout this catalog translates paths against.
    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Commits the current build cycle and opens the next transaction.
    pub fn commit(&self) -> Result<()> {
        trace!("committing catalog");
        self.conn.execute_batch("COMMIT; BEGIN")?;
        Ok(())
    }

    /// Discards all uncommitted mutations of the current cycle.
    pub fn rollback(&self) -> Result<()> {
        trace!("rolling back catalog");
        self.conn.execute_batch("ROLLBACK; BEGIN")?;
        Ok(())
    }

    /// Deletes every row. Used by a full reset; the next build starts from an
    /// empty catalog.
    pub fn wipe(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM context_var_dependencies;
             DELETE FROM context_vars;
             DELETE FROM source_dependencies;
             DELETE FROM source_targets;
             DELETE FROM sources;",
        )?;
        Ok(())
    }

    /// Deletes all rows whose source path lies under any of the given
    /// directories, cascading targets, dependency edges, and context vars.
    pub fn clean(&self, dirs: &[PathBuf]) -> Result<()> {
        for dir in dirs {
            let regex = self.paths.path_regex(dir, true);
            let removed =
                self.conn.execute("DELETE FROM sources WHERE path REGEXP ?1", [&regex])?;
            trace!("cleaned {removed} catalog rows under \"{}\"", dir.display());
        }
        Ok(())
    }

    /// Forward-slash path relative to the source or build root.
    fn rel(&self, path: &Path) -> String {
        self.paths.to_relative(path)
    }

    fn source_record(&self, rel: String, size: i64, modified: i64) -> SourceRecord {
        SourceRecord {
            path: self.paths.to_source(rel),
            size: size.max(0) as u64,
            modified,
        }
    }

    fn target_record(&self, rel: String) -> TargetRecord {
        TargetRecord { path: self.paths.to_build(rel) }
    }

    /// Row id for a known source path.
    fn source_id(&self, path: &Path) -> Result<Option<i64>> {
        use rusqlite::OptionalExtension;
        let rel = self.rel(path);
        let id = self
            .conn
            .query_row("SELECT id FROM sources WHERE path = ?1", [&rel], |row| row.get(0))
            .optional()?;
        Ok(id)
    }
}
