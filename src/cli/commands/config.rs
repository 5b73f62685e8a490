use serde_json::json;
use tracing::instrument;

use crate::cli::context::Context;
use crate::cli::error::CliResult;
use crate::cli::output::{emphasis, Report};
use crate::config::{write_template, PROJECT_CONFIG_FILE};

const REDACTED: &str = "<redacted>";

#[instrument(skip(ctx))]
pub fn show(ctx: &Context) -> CliResult<Report> {
    let config = ctx.config();
    let token = config.access_token().map(|_| REDACTED);
    let project_file = config.project_file().map(|p| p.display().to_string());

    let unset = "(not set)";
    let message = [
        format!("org          = {}", config.organization().unwrap_or(unset)),
        format!("database     = {}", config.database().unwrap_or(unset)),
        format!("branch       = {}", config.branch().unwrap_or(unset)),
        format!("access_token = {}", token.unwrap_or(unset)),
        format!("output       = {}", config.output()),
        format!("api_url      = {}", config.api_url()),
        format!(
            "project_file = {}",
            project_file.as_deref().unwrap_or("(none)")
        ),
    ]
    .join("\n");

    Report::new(
        message,
        &json!({
            "org": config.organization(),
            "database": config.database(),
            "branch": config.branch(),
            "access_token": token,
            "output": config.output(),
            "api_url": config.api_url(),
            "project_file": project_file,
        }),
    )
}

#[instrument(skip(ctx))]
pub fn path(ctx: &Context) -> CliResult<Report> {
    let resolver = ctx.resolver();
    let global = resolver.global_path().map(|p| p.display().to_string());
    let project = ctx.config().project_file().map(|p| p.display().to_string());

    let message = format!(
        "{}: {}\n{}: {}",
        emphasis("global"),
        global.as_deref().unwrap_or("(unknown)"),
        emphasis("project"),
        project.as_deref().unwrap_or("(none found)")
    );
    Report::new(message, &json!({ "global": global, "project": project }))
}

/// Write a commented template to the global file, or to `.psdb.toml` in the working directory.
#[instrument(skip(ctx))]
pub fn init(ctx: &Context, global: bool, force: bool) -> CliResult<Report> {
    let resolver = ctx.resolver();
    let path = if global {
        resolver.require_global_path()?.to_path_buf()
    } else {
        resolver.working_dir().join(PROJECT_CONFIG_FILE)
    };

    write_template(&path, global, force)?;

    Report::new(
        format!("Created config: {}", emphasis(&path.display().to_string())),
        &json!({ "path": path.display().to_string(), "global": global }),
    )
}
