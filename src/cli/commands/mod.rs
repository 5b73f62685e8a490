//! Command handlers
//!
//! Each handler validates nothing the dispatcher already checked: it calls the
//! platform through [`Context`], rewords the classified errors it knows about,
//! and returns a [`Report`] for the printer.

mod backup;
mod branch;
mod config;
mod data_import;
mod database;
mod org;

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use tracing::instrument;

use crate::application::PollPolicy;
use crate::cli::args::{
    BackupCommands, BranchCommands, Cli, Commands, ConfigCommands, DataImportCommands,
    DatabaseCommands, OrgCommands,
};
use crate::cli::context::Context;
use crate::cli::error::CliResult;
use crate::cli::output::{emphasis, Report};

/// Invoke the handler for the parsed leaf command. Called exactly once per run.
pub async fn execute_command(command: &Commands, ctx: &Context) -> CliResult<Report> {
    match command {
        Commands::Backup { command } => match command {
            BackupCommands::Create {
                database,
                branch,
                name,
                wait,
                timeout,
                interval,
            } => {
                let policy = wait.then(|| {
                    PollPolicy::new(Duration::from_secs(*interval), Duration::from_secs(*timeout))
                });
                backup::create(ctx, database, branch, name.as_deref(), policy).await
            }
            BackupCommands::List { database, branch } => backup::list(ctx, database, branch).await,
            BackupCommands::Show {
                database,
                branch,
                id,
            } => backup::show(ctx, database, branch, id).await,
            BackupCommands::Delete {
                database,
                branch,
                id,
            } => backup::delete(ctx, database, branch, id).await,
        },
        Commands::Branch { command } => match command {
            BranchCommands::Create {
                database,
                branch,
                from,
            } => branch::create(ctx, database, branch, from).await,
            BranchCommands::List { database } => branch::list(ctx, database).await,
            BranchCommands::Show { database, branch } => branch::show(ctx, database, branch).await,
            BranchCommands::Delete { database, branch } => {
                branch::delete(ctx, database, branch).await
            }
            BranchCommands::Switch {
                branch,
                create,
                parent_branch,
            } => branch::switch(ctx, branch, *create, parent_branch).await,
        },
        Commands::Database { command } => match command {
            DatabaseCommands::List => database::list(ctx).await,
            DatabaseCommands::Show { database } => database::show(ctx, database).await,
        },
        Commands::DataImports { command } => match command {
            DataImportCommands::MakePrimary { name } => data_import::make_primary(ctx, name).await,
            DataImportCommands::Show { name } => data_import::show(ctx, name).await,
        },
        Commands::Org { command } => match command {
            OrgCommands::Show => org::show(ctx),
            OrgCommands::Switch { org } => org::switch(ctx, org),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => config::show(ctx),
            ConfigCommands::Path => config::path(ctx),
            ConfigCommands::Init { global, force } => config::init(ctx, *global, *force),
        },
        Commands::Completion { shell } => Ok(completion(*shell)),
    }
}

#[instrument]
fn completion(shell: Shell) -> Report {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut script = Vec::new();
    generate(shell, &mut cmd, name, &mut script);
    Report::message(String::from_utf8_lossy(&script).trim_end())
}

/// Message for a branch the platform does not know.
fn branch_not_found(branch: &str, database: &str, org: &str) -> String {
    format!(
        "branch {} does not exist in database {} (organization: {})",
        emphasis(branch),
        emphasis(database),
        emphasis(org)
    )
}

fn database_not_found(database: &str, org: &str) -> String {
    format!(
        "database {} does not exist in organization {}",
        emphasis(database),
        emphasis(org)
    )
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Left-aligned plain-text table, one row per line.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<w$}", w = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers.to_vec())];
    out.extend(rows.iter().map(|row| line(row.iter().map(String::as_str).collect())));
    out.join("\n")
}
