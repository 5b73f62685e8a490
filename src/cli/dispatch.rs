//! Command dispatcher: argv in, exit code out
//!
//! The single place that prints the final result or error and picks the
//! process exit code. Nothing below it writes to the terminal on failure.

use std::ffi::OsString;
use std::io::Write;

use clap::{Parser, ValueEnum};
use tracing::{debug, info};

use crate::cli::args::{Cli, Commands};
use crate::cli::commands::execute_command;
use crate::cli::context::Context;
use crate::cli::error::{CliError, CliResult};
use crate::cli::output::Printer;
use crate::config::{ConfigLayer, EffectiveConfig, OutputMode, Resolver};
use crate::exitcode;
use crate::infrastructure::ServiceContainer;
use crate::util::logging::setup_logging;

/// Parse `args`, resolve configuration, run the selected handler once and
/// render its outcome. Returns the process exit code.
///
/// Argument errors never reach a handler: a missing positional or bad flag
/// value exits with [`exitcode::USAGE`] before any config is read.
pub async fn run<I, T>(args: I, container: ServiceContainer) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let ServiceContainer {
        resolver,
        clients,
        cancel,
        mut stdout,
        mut stderr,
        show_progress,
    } = container;

    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let cli = match Cli::try_parse_from(args.iter().cloned()) {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // help and version are not failures
            let _ = write!(stdout, "{}", e.render());
            let _ = stdout.flush();
            return exitcode::OK;
        }
        Err(e) => {
            let mode = requested_output(&args).or_else(|| resolver.env_output());
            if mode == Some(OutputMode::Json) {
                colored::control::set_override(false);
                let printer = Printer::new(OutputMode::Json, false, stdout, stderr);
                return fail(&printer, CliError::Usage(usage_message(&e)));
            }
            let _ = write!(stderr, "{}", e.render());
            let _ = stderr.flush();
            return exitcode::USAGE;
        }
    };

    setup_logging(cli.global.verbose);
    debug!("command: {:?}", cli.command);

    let flags = cli.global.to_layer();
    let config = match resolve(&cli.command, &resolver, flags.clone()) {
        Ok(config) => config,
        Err(e) => {
            let mode = flags.output.unwrap_or_default();
            let printer = Printer::new(mode, false, stdout, stderr);
            return fail(&printer, e);
        }
    };

    if config.output().is_json() {
        colored::control::set_override(false);
    }
    let printer = Printer::new(config.output(), show_progress, stdout, stderr);

    if let Err(e) = check_requirements(&cli.command, &config) {
        return fail(&printer, e);
    }

    let ctx = Context::new(config, resolver, printer, clients, cancel);
    let result = match execute_command(&cli.command, &ctx).await {
        Ok(report) => ctx.printer().render(&report),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("command succeeded");
            exitcode::OK
        }
        Err(e) => fail(ctx.printer(), e),
    }
}

/// Last `--output` value on a command line that failed to parse.
fn requested_output(args: &[OsString]) -> Option<OutputMode> {
    let mut mode = None;
    let mut iter = args.iter().skip(1).map(|arg| arg.to_string_lossy());
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        let value = match arg.strip_prefix("--output") {
            Some("") => iter.next().map(|v| v.into_owned()),
            Some(rest) => rest.strip_prefix('=').map(str::to_string),
            None => None,
        };
        if let Some(parsed) =
            value.and_then(|v| <OutputMode as ValueEnum>::from_str(v.trim(), true).ok())
        {
            mode = Some(parsed);
        }
    }
    mode
}

/// Clap's error text without its `error:` prefix.
fn usage_message(error: &clap::Error) -> String {
    let text = error.render().to_string();
    let text = text.trim();
    text.strip_prefix("error:").unwrap_or(text).trim().to_string()
}

/// Merge every config layer, or only the flags for commands that read no settings.
fn resolve(
    command: &Commands,
    resolver: &Resolver,
    flags: ConfigLayer,
) -> CliResult<EffectiveConfig> {
    match command {
        Commands::Completion { .. } => Ok(EffectiveConfig::from_layers([flags], None)),
        _ => Ok(resolver.resolve(flags)?),
    }
}

/// Required settings are checked for the invoked leaf only.
fn check_requirements(command: &Commands, config: &EffectiveConfig) -> CliResult<()> {
    for field in command.requirements() {
        config.require(*field)?;
    }
    Ok(())
}

fn fail(printer: &Printer, error: CliError) -> i32 {
    let code = error.exit_code();
    debug!(kind = error.kind(), code, "command failed: {:?}", error);
    printer.error(&error);
    code
}
