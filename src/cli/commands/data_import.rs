use tracing::instrument;

use crate::application::ErrorKind;
use crate::cli::context::{reword, Context};
use crate::cli::error::CliResult;
use crate::cli::output::{emphasis, Report};

/// Promote the platform copy of an imported database to primary.
#[instrument(skip(ctx))]
pub async fn make_primary(ctx: &Context, database: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let mut progress = ctx.printer().progress(format!(
        "Switching {} to primary...",
        emphasis(database)
    ));
    let import = ctx
        .call(api.make_primary(org, database))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            format!("unable to switch database {} to primary", emphasis(database))
        }))?;
    progress.finish();

    Report::new(
        format!(
            "Successfully switched {} to primary. The external database is now a replica.",
            emphasis(database)
        ),
        &import,
    )
}

#[instrument(skip(ctx))]
pub async fn show(ctx: &Context, database: &str) -> CliResult<Report> {
    let org = ctx.org()?;
    let api = ctx.client()?;

    let import = ctx
        .call(api.get_data_import(org, database))
        .await
        .map_err(reword(ErrorKind::NotFound, || {
            format!(
                "no data import exists for database {} (organization: {})",
                emphasis(database),
                emphasis(org)
            )
        }))?;

    let mut message = format!(
        "Data import into {} is {}",
        emphasis(database),
        emphasis(&import.state)
    );
    if !import.import_check_errors.is_empty() {
        message.push_str(&format!("\nCheck errors: {}", import.import_check_errors));
    }
    Report::new(message, &import)
}
