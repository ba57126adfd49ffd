use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// An I/O error paired with the path it occurred on.
#[derive(Debug, Error)]
#[error("\"{}\": {io}", .path.display())]
pub struct AppIoError {
    io: io::Error,
    path: PathBuf,
}

impl AppIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path the error occurred on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying `io::Error`.
    pub fn inner(&self) -> &io::Error {
        &self.io
    }
}

impl From<AppIoError> for io::Error {
    fn from(err: AppIoError) -> Self {
        err.io
    }
}

/// Various error types for app, catalog, and processor operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// The requested app root is missing or carries no `pydgeot.json`.
    #[error("app root '{}' does not exist or is not a valid app directory", .0.display())]
    InvalidAppRoot(PathBuf),
    /// Malformed configuration, or configuration referencing unknown names.
    #[error("could not load config '{}': {message}", .path.display())]
    Config { path: PathBuf, message: String },
    #[error("command '{0}' does not exist")]
    UnknownCommand(String),
    #[error("incorrect number of arguments passed to command '{0}'")]
    CommandUsage(String),
    /// A command refused to run; the message is user facing.
    #[error("{0}")]
    Command(String),
    /// Raised within a processor call. Recovered by the dispatcher; the
    /// affected path is skipped for the cycle.
    #[error("processing '{path}' with {processor} failed: {message}")]
    Processor { path: String, processor: String, message: String },
    #[error("multiple processors claim '{0}' after negotiation")]
    AmbiguousProcessor(String),
    #[error("glob pattern '{0}' is malformed")]
    MalformedGlob(String),
    /// Catalog I/O failure. Fatal to the build cycle.
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] AppIoError),
    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        AppIoError::new(err, path).into()
    }

    pub fn config(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        AppError::Config { path: path.into(), message: message.to_string() }
    }

    pub fn msg(msg: impl std::fmt::Display) -> Self {
        AppError::Message(msg.to_string())
    }

    /// Short category tag used when surfacing failures to the user.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::InvalidAppRoot(_) => "app",
            AppError::Config { .. } => "config",
            AppError::UnknownCommand(_)
            | AppError::CommandUsage(_)
            | AppError::Command(_) => "command",
            AppError::Processor { .. } | AppError::AmbiguousProcessor(_) => "processor",
            AppError::MalformedGlob(_) => "config",
            AppError::Store(_) => "store",
            AppError::Io(_) => "io",
            AppError::Message(_) => "error",
        }
    }
}

macro_rules! command_error {
    ($($tt:tt)*) => {
        $crate::error::AppError::Command(format!($($tt)*))
    };
}
