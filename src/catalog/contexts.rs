//! Context variable operations.
//!
//! A context variable is a named value published by a source during prepare,
//! queryable by any other source during prepare or generate. Consumers
//! declare the names they demand; the producer is resolved by name lookup, so
//! a dependency can be declared before the variable exists.

use super::{Catalog, SourceRecord};
use crate::error::{AppError, Result};
use rusqlite::params;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

impl Catalog {
    /// Sets a context var for the source path, replacing any other values
    /// with the same name and source.
    pub fn set_context_var(&self, source: &Path, name: &str, value: &str) -> Result<()> {
        self.remove_context_vars(Some(source), Some(name))?;
        self.add_context_var(source, name, value)
    }

    /// Adds a context var for the source path. Multiple values with the same
    /// name and source are permitted.
    pub fn add_context_var(&self, source: &Path, name: &str, value: &str) -> Result<()> {
        let sid = self.add_source(source)?;
        self.conn.execute(
            "INSERT INTO context_vars (name, value, source_id) VALUES (?1, ?2, ?3)",
            params![name, value, sid],
        )?;
        Ok(())
    }

    /// Removes context vars by source and/or name. At least one of the two
    /// must be given.
    pub fn remove_context_vars(&self, source: Option<&Path>, name: Option<&str>) -> Result<()> {
        match (source, name) {
            (Some(source), name) => {
                let Some(sid) = self.source_id(source)? else { return Ok(()) };
                match name {
                    Some(name) => self.conn.execute(
                        "DELETE FROM context_vars WHERE name = ?1 AND source_id = ?2",
                        params![name, sid],
                    )?,
                    None => self
                        .conn
                        .execute("DELETE FROM context_vars WHERE source_id = ?1", [sid])?,
                };
            }
            (None, Some(name)) => {
                self.conn.execute("DELETE FROM context_vars WHERE name = ?1", [name])?;
            }
            (None, None) => {
                return Err(AppError::msg("either a source or a name must be given"));
            }
        }
        Ok(())
    }

    /// Returns all values with the given name, optionally restricted to one
    /// producing source.
    pub fn get_context_vars(&self, name: &str, source: Option<&Path>) -> Result<Vec<String>> {
        let mut values = Vec::new();
        match source {
            None => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT c.value FROM context_vars AS c WHERE c.name = ?1")?;
                let rows = stmt.query_map([name], |row| row.get::<_, String>(0))?;
                for row in rows {
                    values.push(row?);
                }
            }
            Some(source) => {
                let rel = self.rel(source);
                let mut stmt = self.conn.prepare(
                    "SELECT c.value
                     FROM context_vars AS c
                         INNER JOIN sources s ON s.id = c.source_id
                     WHERE c.name = ?1 AND s.path = ?2",
                )?;
                let rows = stmt.query_map(params![name, rel], |row| row.get::<_, String>(0))?;
                for row in rows {
                    values.push(row?);
                }
            }
        }
        Ok(values)
    }

    /// Convenience accessor for the first value with the given name.
    pub fn get_first_context_var(
        &self,
        name: &str,
        source: Option<&Path>,
    ) -> Result<Option<String>> {
        Ok(self.get_context_vars(name, source)?.into_iter().next())
    }

    /// Replaces the set of variable names the source path demands.
    pub fn set_context_var_deps(&self, source: &Path, names: &[String]) -> Result<()> {
        let sid = self.add_source(source)?;
        self.conn
            .execute("DELETE FROM context_var_dependencies WHERE dependency_id = ?1", [sid])?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO context_var_dependencies (name, dependency_id) VALUES (?1, ?2)",
        )?;
        for name in names {
            stmt.execute(params![name, sid])?;
        }
        Ok(())
    }

    /// Returns the variable names related to the source path: forward, the
    /// names it demands; reverse, the names it publishes.
    pub fn get_context_var_dep_names(
        &self,
        source: &Path,
        reverse: bool,
    ) -> Result<BTreeSet<String>> {
        let rel = self.rel(source);
        let sql = if reverse {
            "SELECT c.name
             FROM context_vars AS c
                 INNER JOIN sources s ON s.id = c.source_id
             WHERE s.path = ?1"
        } else {
            "SELECT cd.name
             FROM context_var_dependencies AS cd
                 INNER JOIN sources s ON s.id = cd.dependency_id
             WHERE s.path = ?1"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([&rel], |row| row.get::<_, String>(0))?;
        let mut names = BTreeSet::new();
        for row in rows {
            names.insert(row?);
        }
        Ok(names)
    }

    /// Returns the sources related to the source path through context var
    /// names: forward, the producers of the names it demands; reverse, the
    /// consumers demanding the names it publishes.
    ///
    /// With `recursive`, the relation is closed transitively in the same
    /// direction, terminating on cycles.
    pub fn get_context_var_dep_sources(
        &self,
        source: &Path,
        reverse: bool,
        recursive: bool,
    ) -> Result<BTreeSet<SourceRecord>> {
        if recursive {
            return self.get_context_var_dep_sources_recursive(source, reverse);
        }
        let rel = self.rel(source);
        let sql = if reverse {
            // Consumers of names this source publishes.
            "SELECT ds.path, ds.size, ds.modified
             FROM context_var_dependencies AS cd
                 INNER JOIN sources ds ON ds.id = cd.dependency_id
             WHERE cd.name IN (
                 SELECT c.name
                 FROM context_vars AS c
                     INNER JOIN sources s ON s.id = c.source_id
                 WHERE s.path = ?1)"
        } else {
            // Producers of names this source demands.
            "SELECT ds.path, ds.size, ds.modified
             FROM context_vars AS dc
                 INNER JOIN sources ds ON ds.id = dc.source_id
             WHERE dc.name IN (
                 SELECT cd.name
                 FROM context_var_dependencies AS cd
                     INNER JOIN sources s ON s.id = cd.dependency_id
                 WHERE s.path = ?1)"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([&rel], |row| {
            Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
        })?;
        let mut records = BTreeSet::new();
        for row in rows {
            let (path, size, modified) = row?;
            records.insert(self.source_record(path, size, modified));
        }
        Ok(records)
    }

    fn get_context_var_dep_sources_recursive(
        &self,
        source: &Path,
        reverse: bool,
    ) -> Result<BTreeSet<SourceRecord>> {
        let mut records = BTreeSet::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: Vec<PathBuf> = vec![source.to_path_buf()];
        visited.insert(self.rel(source));
        while let Some(path) = queue.pop() {
            for related in self.get_context_var_dep_sources(&path, reverse, false)? {
                if visited.insert(self.rel(&related.path)) {
                    queue.push(related.path.clone());
                }
                records.insert(related);
            }
        }
        Ok(records)
    }
}
