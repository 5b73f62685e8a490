use serde_json::json;
use tracing::instrument;

use crate::cli::context::Context;
use crate::cli::error::CliResult;
use crate::cli::output::{emphasis, Report};
use crate::config::set_global_org;

#[instrument(skip(ctx))]
pub fn show(ctx: &Context) -> CliResult<Report> {
    let org = ctx.org()?;
    Report::new(
        format!("Currently using organization: {}", emphasis(org)),
        &json!({ "org": org }),
    )
}

/// Persist `org` as the default organization in the global config.
#[instrument(skip(ctx))]
pub fn switch(ctx: &Context, org: &str) -> CliResult<Report> {
    let path = ctx.resolver().require_global_path()?;
    set_global_org(path, org)?;

    Report::new(
        format!("Successfully switched to organization {}", emphasis(org)),
        &json!({ "org": org, "config_file": path.display().to_string() }),
    )
}
