//! CLI-level errors (wraps config, auth and normalized remote errors)

use std::io;

use thiserror::Error;

use crate::application::{ErrorKind, NormalizedError};
use crate::config::ConfigError;
use crate::exitcode;
use crate::infrastructure::AuthError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Remote(#[from] NormalizedError),

    #[error("{message}")]
    OperationFailed { message: String },

    #[error("{message}")]
    Timeout { message: String },

    #[error("interrupted")]
    Interrupted,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Kind of the underlying remote failure, if this is one.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            CliError::Remote(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Stable machine-readable tag, emitted as `kind` in JSON error documents.
    pub fn kind(&self) -> &'static str {
        match self {
            CliError::Usage(_) => "usage",
            CliError::Config(_) => "config",
            CliError::Auth(_) => "auth",
            CliError::Remote(e) => e.kind().as_str(),
            CliError::OperationFailed { .. } => "operation_failed",
            CliError::Timeout { .. } => "timeout",
            CliError::Interrupted => "interrupted",
            CliError::Io { .. } => "io",
            CliError::Encode(_) => "encode",
        }
    }

    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => exitcode::USAGE,
            CliError::Config(e) if e.is_io() => exitcode::IOERR,
            CliError::Config(_) => exitcode::CONFIG,
            CliError::Auth(_) => exitcode::NOPERM,
            CliError::Remote(e) => match e.kind() {
                ErrorKind::NotFound => exitcode::NOINPUT,
                ErrorKind::Unauthorized => exitcode::NOPERM,
                ErrorKind::MalformedResponse => exitcode::DATAERR,
                ErrorKind::Conflict => exitcode::CANTCREAT,
                ErrorKind::Unknown => exitcode::UNAVAILABLE,
            },
            CliError::OperationFailed { .. } => exitcode::SOFTWARE,
            CliError::Timeout { .. } => exitcode::TEMPFAIL,
            CliError::Interrupted => exitcode::INTERRUPTED,
            CliError::Io { .. } => exitcode::IOERR,
            CliError::Encode(_) => exitcode::SOFTWARE,
        }
    }
}
