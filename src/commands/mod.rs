//! Command registry.
//!
//! Commands are plain functions taking the app and positional arguments.
//! The built-in set is always available; plugins may contribute more.

mod builtins;

use crate::{error::Result, App};

/// A named command with its help text.
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    /// Positional argument summary shown in listings, e.g. `PATH [PATH]...`.
    pub help_args: &'static str,
    pub help: &'static str,
    pub run: fn(&mut App, &[String]) -> Result<()>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("help_args", &self.help_args)
            .finish()
    }
}

/// The built-in command set.
pub fn builtins() -> Vec<Command> {
    builtins::all()
}
