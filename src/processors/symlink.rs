//! Lowest priority fallback that symlinks sources into the build tree.

use super::{Plugin, Processor};
use crate::{
    error::{AppError, Result},
    utils, App,
};
use cfg_if::cfg_if;
use std::{fs, io, path::Path};

pub(super) struct SymlinkFallbackPlugin;

impl Plugin for SymlinkFallbackPlugin {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn processors(&self) -> Vec<Box<dyn Processor>> {
        vec![Box::new(SymlinkFallbackProcessor)]
    }
}

fn create_symlink(source: &Path, target: &Path) -> io::Result<()> {
    if target.is_file() || target.is_symlink() {
        fs::remove_file(target)?;
    }
    cfg_if! {
        if #[cfg(windows)] {
            std::os::windows::fs::symlink_file(source, target)
        } else {
            std::os::unix::fs::symlink(source, target)
        }
    }
}

/// Accepts every path and links it into the build tree instead of copying.
pub struct SymlinkFallbackProcessor;

impl Processor for SymlinkFallbackProcessor {
    fn name(&self) -> &'static str {
        "SymlinkFallbackProcessor"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn can_process(&self, _app: &App, _path: &Path) -> bool {
        true
    }

    fn prepare(&self, app: &App, path: &Path) -> Result<()> {
        let target = app.paths().to_build(path);
        app.catalog().set_targets(path, &[target])?;
        Ok(())
    }

    fn generate(&self, app: &App, path: &Path) -> Result<()> {
        let target = app.paths().to_build(path);
        utils::create_parent_dir_all(&target)?;
        create_symlink(path, &target).map_err(|err| AppError::io(err, &target))?;
        Ok(())
    }
}
