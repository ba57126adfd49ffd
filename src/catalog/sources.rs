//! Source, target, and structural dependency operations.

use super::{Catalog, SourceRecord, TargetRecord};
use crate::{error::Result, utils};
use rusqlite::{params, OptionalExtension};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

impl Catalog {
    /// Upserts a source row, refreshing `(size, modified)` from disk when
    /// they changed, and returns the row id.
    ///
    /// A missing file is recorded as `(0, 0)`.
    pub fn add_source(&self, source: &Path) -> Result<i64> {
        let rel = self.rel(source);
        let (size, modified) = utils::file_stat(&self.paths.to_source(source));

        let existing: Option<(i64, i64, i64)> = self
            .conn
            .query_row(
                "SELECT id, size, modified FROM sources WHERE path = ?1",
                [&rel],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        if let Some((id, old_size, old_modified)) = existing {
            if size as i64 != old_size || modified != old_modified {
                self.conn.execute(
                    "UPDATE sources SET size = ?1, modified = ?2 WHERE id = ?3",
                    params![size as i64, modified, id],
                )?;
            }
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO sources (path, size, modified) VALUES (?1, ?2, ?3)",
            params![rel, size as i64, modified],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Returns the record for the given source path, if one exists.
    pub fn get_source(&self, source: &Path) -> Result<Option<SourceRecord>> {
        let rel = self.rel(source);
        let record = self
            .conn
            .query_row(
                "SELECT path, size, modified FROM sources WHERE path = ?1",
                [&rel],
                |row| Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(record.map(|(path, size, modified)| self.source_record(path, size, modified)))
    }

    /// Returns the records for sources in the given directory.
    pub fn get_sources(&self, dir: &Path, recursive: bool) -> Result<BTreeSet<SourceRecord>> {
        let regex = self.paths.path_regex(dir, recursive);
        let mut stmt = self
            .conn
            .prepare("SELECT path, size, modified FROM sources WHERE path REGEXP ?1")?;
        let rows = stmt.query_map([&regex], |row| {
            Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
        })?;
        let mut records = BTreeSet::new();
        for row in rows {
            let (path, size, modified) = row?;
            records.insert(self.source_record(path, size, modified));
        }
        Ok(records)
    }

    /// Removes a source row. Targets, dependency edges on both ends, and
    /// context vars cascade.
    pub fn remove_source(&self, source: &Path) -> Result<()> {
        let rel = self.rel(source);
        self.conn.execute("DELETE FROM sources WHERE path = ?1", [&rel])?;
        Ok(())
    }

    /// Replaces the target set for a source path.
    pub fn set_targets(&self, source: &Path, targets: &[PathBuf]) -> Result<()> {
        let rel = self.rel(source);
        self.conn.execute(
            "DELETE FROM source_targets
             WHERE id IN (
                 SELECT st.id
                 FROM source_targets st
                     INNER JOIN sources s ON s.id = st.source_id
                 WHERE s.path = ?1)",
            [&rel],
        )?;
        let sid = self.add_source(source)?;
        let mut stmt = self
            .conn
            .prepare("INSERT INTO source_targets (source_id, path) VALUES (?1, ?2)")?;
        for target in targets {
            stmt.execute(params![sid, self.rel(target)])?;
        }
        Ok(())
    }

    /// Returns the targets a source path has generated.
    pub fn get_targets(&self, source: &Path) -> Result<BTreeSet<TargetRecord>> {
        let rel = self.rel(source);
        let mut stmt = self.conn.prepare(
            "SELECT st.path
             FROM source_targets AS st
                 INNER JOIN sources s ON s.id = st.source_id
             WHERE s.path = ?1",
        )?;
        let rows = stmt.query_map([&rel], |row| row.get::<_, String>(0))?;
        let mut records = BTreeSet::new();
        for row in rows {
            records.insert(self.target_record(row?));
        }
        Ok(records)
    }

    /// Reverse target lookup: the sources that own the given target path.
    pub fn get_target_sources(&self, target: &Path) -> Result<BTreeSet<SourceRecord>> {
        let rel = self.rel(target);
        let mut stmt = self.conn.prepare(
            "SELECT s.path, s.size, s.modified
             FROM source_targets AS st
                 INNER JOIN sources s ON s.id = st.source_id
             WHERE st.path = ?1",
        )?;
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

    /// Replaces the structural dependency edges for a source path, ensuring a
    /// row exists for every dependency.
    pub fn set_dependencies(&self, source: &Path, dependencies: &[PathBuf]) -> Result<()> {
        let sid = self.add_source(source)?;
        self.conn.execute("DELETE FROM source_dependencies WHERE source_id = ?1", [sid])?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO source_dependencies (source_id, dependency_id) VALUES (?1, ?2)",
        )?;
        for dependency in dependencies {
            let did = self.add_source(dependency)?;
            stmt.execute(params![sid, did])?;
        }
        Ok(())
    }

    /// Returns the structural dependencies of a source path.
    ///
    /// If `fileA.html` and `fileB.html` both extend `base.html`:
    /// - `get_dependencies(fileA, false, _)` yields `base.html`
    /// - `get_dependencies(base, true, _)` yields both files
    ///
    /// With `recursive`, dependencies of dependencies are included; the walk
    /// keeps a visited set, so cycles terminate.
    pub fn get_dependencies(
        &self,
        source: &Path,
        reverse: bool,
        recursive: bool,
    ) -> Result<BTreeSet<SourceRecord>> {
        if recursive {
            return self.get_dependencies_recursive(source, reverse);
        }
        let rel = self.rel(source);
        let sql = if reverse {
            "SELECT s.path, s.size, s.modified
             FROM source_dependencies AS sd
                 INNER JOIN sources s ON s.id = sd.source_id
                 INNER JOIN sources d ON d.id = sd.dependency_id
             WHERE d.path = ?1"
        } else {
            "SELECT d.path, d.size, d.modified
             FROM source_dependencies AS sd
                 INNER JOIN sources s ON s.id = sd.source_id
                 INNER JOIN sources d ON d.id = sd.dependency_id
             WHERE s.path = ?1"
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

    fn get_dependencies_recursive(
        &self,
        source: &Path,
        reverse: bool,
    ) -> Result<BTreeSet<SourceRecord>> {
        let mut records = BTreeSet::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut queue: Vec<PathBuf> = vec![source.to_path_buf()];
        visited.insert(self.rel(source));
        while let Some(path) = queue.pop() {
            for dep in self.get_dependencies(&path, reverse, false)? {
                if visited.insert(self.rel(&dep.path)) {
                    queue.push(dep.path.clone());
                }
                records.insert(dep);
            }
        }
        Ok(records)
    }
}
