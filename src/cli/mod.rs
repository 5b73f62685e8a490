//! CLI layer: argument parsing, command dispatch and output

pub mod args;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod output;

pub use args::{Cli, Commands};
pub use context::Context;
pub use dispatch::run;
pub use error::{CliError, CliResult};
pub use output::{Printer, Progress, Report};
