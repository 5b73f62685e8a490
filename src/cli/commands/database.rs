use tracing::instrument;

use super::{database_not_found, table, timestamp};
use crate::application::ErrorKind;
use crate::cli::context::{reword, Context};
use crate::cli::error::CliResult;
use crate::cli::output::{emphasis, Report};
use crate::domain::Database;

fn row(db: &Database) -> Vec<String> {
    vec![
        db.name.clone(),
        db.region
            .as_ref()
            .map(|r| r.slug.clone())
            .unwrap_or_else(|| "-".to_string()),
        db.state.clone().unwrap_or_else(|| "-".to_string()),
        timestamp(&db.created_at),
        db.notes.clone(),
    ]
}

const HEADERS: &[&str] = &["NAME", "REGION", "STATE", "CREATED AT", "NOTES"];

#[instrument(skip(ctx))]
pub async fn list(ctx: &Context) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let databases = {
        let _progress = ctx
            .printer()
            .progress(format!("Fetching databases in {}...", emphasis(org)));
        ctx.call(api.list_databases(org)).await?
    };

    let message = if databases.is_empty() {
        format!("No databases exist in organization {}.", emphasis(org))
    } else {
        table(HEADERS, &databases.iter().map(row).collect::<Vec<_>>())
    };
    Report::new(message, &databases)
}

#[instrument(skip(ctx))]
pub async fn show(ctx: &Context, database: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let found = ctx
        .call(api.get_database(org, database))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            database_not_found(database, org)
        }))?;

    Report::new(table(HEADERS, &[row(&found)]), &found)
}
