use serde_json::json;
use tracing::{debug, info, instrument};

use super::{branch_not_found, table, timestamp};
use crate::application::{ErrorKind, PollOutcome, PollPolicy};
use crate::cli::context::{reword, Context};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output::{emphasis, Report};
use crate::domain::{Backup, BackupState, CreateBackupRequest};

#[instrument(skip(ctx))]
pub async fn create(
    ctx: &Context,
    database: &str,
    branch: &str,
    name: Option<&str>,
    wait: Option<PollPolicy>,
) -> CliResult<Report> {
    let org = ctx.org()?;
    let client = ctx.client()?;
    let api = client.as_ref();
    let request = CreateBackupRequest {
        name: name.map(str::to_string),
    };

    let mut progress = ctx.printer().progress(format!(
        "Creating backup of {} in {}...",
        emphasis(branch),
        emphasis(database)
    ));
    let backup = ctx
        .call(api.create_backup(org, database, branch, &request))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            branch_not_found(branch, database, org)
        }))?;
    info!("backup {} created in state {}", backup.id, backup.state);

    let backup = match wait {
        Some(policy) if !backup.state.is_terminal() => {
            progress.set_message(format!(
                "Waiting for backup {} to finish...",
                emphasis(&backup.name)
            ));
            let id = backup.id.as_str();
            let outcome = ctx
                .poll(
                    policy,
                    move || api.get_backup(org, database, branch, id),
                    |b: &Backup| b.state.is_terminal(),
                )
                .await?;
            match outcome {
                PollOutcome::Done(done) => done,
                PollOutcome::TimedOut(last) => {
                    return Err(CliError::Timeout {
                        message: format!(
                            "backup {} is still {} after {}s; check it with `psdb backup show {} {} {}`",
                            last.name,
                            last.state,
                            policy.timeout.as_secs(),
                            database,
                            branch,
                            last.id
                        ),
                    })
                }
                PollOutcome::Cancelled => return Err(CliError::Interrupted),
            }
        }
        _ => backup,
    };
    progress.finish();

    if wait.is_some() && backup.state != BackupState::Success {
        return Err(CliError::OperationFailed {
            message: format!("backup {} finished in state {}", backup.name, backup.state),
        });
    }

    let verb = if wait.is_some() { "completed" } else { "started" };
    Report::new(
        format!(
            "Backup {} was successfully {} for branch {} of {}",
            emphasis(&backup.name),
            verb,
            emphasis(branch),
            emphasis(database)
        ),
        &backup,
    )
}

#[instrument(skip(ctx))]
pub async fn list(ctx: &Context, database: &str, branch: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let backups = {
        let _progress = ctx.printer().progress(format!(
            "Fetching backups for {} in {}...",
            emphasis(branch),
            emphasis(database)
        ));
        ctx.call(api.list_backups(org, database, branch))
            .await
            .map_err(reword(ErrorKind::NotFound, || {
                branch_not_found(branch, database, org)
            }))?
    };
    debug!("{} backup(s)", backups.len());

    let message = if backups.is_empty() {
        format!(
            "No backups exist in branch {} of {}.",
            emphasis(branch),
            emphasis(database)
        )
    } else {
        let rows: Vec<Vec<String>> = backups
            .iter()
            .map(|b| {
                vec![
                    b.id.clone(),
                    b.name.clone(),
                    b.state.to_string(),
                    b.size.to_string(),
                    timestamp(&b.created_at),
                ]
            })
            .collect();
        table(&["ID", "NAME", "STATE", "SIZE", "CREATED AT"], &rows)
    };
    Report::new(message, &backups)
}

#[instrument(skip(ctx))]
pub async fn show(ctx: &Context, database: &str, branch: &str, id: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let backup = ctx
        .call(api.get_backup(org, database, branch, id))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            format!(
                "backup {} does not exist in branch {} of database {} (organization: {})",
                emphasis(id),
                emphasis(branch),
                emphasis(database),
                emphasis(org)
            )
        }))?;

    let completed = backup
        .completed_at
        .as_ref()
        .map(timestamp)
        .unwrap_or_else(|| "-".to_string());
    let message = table(
        &["ID", "NAME", "STATE", "SIZE", "CREATED AT", "COMPLETED AT"],
        &[vec![
            backup.id.clone(),
            backup.name.clone(),
            backup.state.to_string(),
            backup.size.to_string(),
            timestamp(&backup.created_at),
            completed,
        ]],
    );
    Report::new(message, &backup)
}

#[instrument(skip(ctx))]
pub async fn delete(ctx: &Context, database: &str, branch: &str, id: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    ctx.call(api.delete_backup(org, database, branch, id))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            format!(
                "backup {} does not exist in branch {} of database {} (organization: {})",
                emphasis(id),
                emphasis(branch),
                emphasis(database),
                emphasis(org)
            )
        }))?;

    Report::new(
        format!("Backup {} was successfully deleted!", emphasis(id)),
        &json!({ "database": database, "branch": branch, "id": id, "deleted": true }),
    )
}
