use serde_json::json;
use tracing::{debug, instrument};

use super::{branch_not_found, database_not_found, table, timestamp};
use crate::application::ErrorKind;
use crate::cli::context::{reword, Context};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output::{emphasis, Report};
use crate::config::ProjectConfig;
use crate::domain::{Branch, CreateBranchRequest};

fn rows(branches: &[Branch]) -> Vec<Vec<String>> {
    branches
        .iter()
        .map(|b| {
            vec![
                b.name.clone(),
                b.parent_branch.clone().unwrap_or_else(|| "-".to_string()),
                if b.production { "yes" } else { "no" }.to_string(),
                if b.ready { "yes" } else { "no" }.to_string(),
                timestamp(&b.created_at),
            ]
        })
        .collect()
}

const HEADERS: &[&str] = &["NAME", "PARENT", "PRODUCTION", "READY", "CREATED AT"];

#[instrument(skip(ctx))]
pub async fn create(ctx: &Context, database: &str, branch: &str, from: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;
    let request = CreateBranchRequest {
        name: branch.to_string(),
        parent_branch: from.to_string(),
    };

    let mut progress = ctx.printer().progress(format!(
        "Creating branch {} from {} in {}...",
        emphasis(branch),
        emphasis(from),
        emphasis(database)
    ));
    let created = ctx
        .call(api.create_branch(org, database, &request))
        .await
        .map_err(reword(ErrorKind::Conflict, || {
            format!(
                "branch {} already exists in database {}",
                emphasis(branch),
                emphasis(database)
            )
        }))
        .map_err(reword(ErrorKind::NotFound, || {
            database_not_found(database, org)
        }))?;
    progress.finish();

    Report::new(
        format!(
            "Branch {} was successfully created from {} in {}",
            emphasis(&created.name),
            emphasis(from),
            emphasis(database)
        ),
        &created,
    )
}

#[instrument(skip(ctx))]
pub async fn list(ctx: &Context, database: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let branches = ctx
        .call(api.list_branches(org, database))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            database_not_found(database, org)
        }))?;

    let message = if branches.is_empty() {
        format!("No branches exist in {}.", emphasis(database))
    } else {
        table(HEADERS, &rows(&branches))
    };
    Report::new(message, &branches)
}

#[instrument(skip(ctx))]
pub async fn show(ctx: &Context, database: &str, branch: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let found = ctx
        .call(api.get_branch(org, database, branch))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            branch_not_found(branch, database, org)
        }))?;

    let message = table(HEADERS, &rows(std::slice::from_ref(&found)));
    Report::new(message, &found)
}

#[instrument(skip(ctx))]
pub async fn delete(ctx: &Context, database: &str, branch: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    ctx.call(api.delete_branch(org, database, branch))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            branch_not_found(branch, database, org)
        }))?;

    Report::new(
        format!(
            "Branch {} was successfully deleted from {}!",
            emphasis(branch),
            emphasis(database)
        ),
        &json!({ "database": database, "branch": branch, "deleted": true }),
    )
}

/// Point the project config at `branch`, creating it first when asked.
///
/// The project file is written only after the branch is known to exist.
#[instrument(skip(ctx))]
pub async fn switch(
    ctx: &Context,
    branch: &str,
    create: bool,
    parent_branch: &str,
) -> CliResult<Report> {
    let org = ctx.org()?;
    let database = ctx.database()?;
    let api = ctx.client()?;

    ctx.printer().notice(&format!(
        "Finding branch {} on database {}",
        emphasis(branch),
        emphasis(database)
    ));

    let (found, created) = match ctx.call(api.get_branch(org, database, branch)).await {
        Ok(found) => (found, false),
        Err(CliError::Remote(e)) if e.is(ErrorKind::NotFound) => {
            if !create {
                return Err(CliError::Usage(format!(
                    "branch {} does not exist in database {}. Use --create to create it from {} (or pick another parent with --parent-branch)",
                    emphasis(branch),
                    emphasis(database),
                    emphasis(parent_branch)
                )));
            }
            debug!("branch missing, creating from {}", parent_branch);

            let mut progress = ctx.printer().progress(format!(
                "Creating branch {} from {}...",
                emphasis(branch),
                emphasis(parent_branch)
            ));
            let request = CreateBranchRequest {
                name: branch.to_string(),
                parent_branch: parent_branch.to_string(),
            };
            let new_branch = ctx
                .call(api.create_branch(org, database, &request))
                .await
                .map_err(reword(ErrorKind::NotFound, || {
                    branch_not_found(parent_branch, database, org)
                }))?;
            progress.finish();
            (new_branch, true)
        }
        Err(e) => return Err(e),
    };

    let target = ctx.resolver().project_target();
    ProjectConfig {
        database: database.to_string(),
        branch: found.name.clone(),
    }
    .write(&target)?;
    debug!("project config written to {}", target.display());

    Report::new(
        format!(
            "Successfully switched to branch {} on database {}",
            emphasis(&found.name),
            emphasis(database)
        ),
        &json!({
            "database": database,
            "branch": found,
            "created": created,
            "config_file": target.display().to_string(),
        }),
    )
}
