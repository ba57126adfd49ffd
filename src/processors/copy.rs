//! Lowest priority fallback that copies sources into the build tree.

use super::{Plugin, Processor};
use crate::{
    error::{AppError, Result},
    utils, App,
};
use std::{fs, path::Path};

pub(super) struct CopyFallbackPlugin;

impl Plugin for CopyFallbackPlugin {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn processors(&self) -> Vec<Box<dyn Processor>> {
        vec![Box::new(CopyFallbackProcessor)]
    }
}

/// Accepts every path and copies it verbatim to the build tree.
pub struct CopyFallbackProcessor;

impl Processor for CopyFallbackProcessor {
    fn name(&self) -> &'static str {
        "CopyFallbackProcessor"
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
        fs::copy(path, &target).map_err(|err| AppError::io(err, &target))?;
        Ok(())
    }
}
