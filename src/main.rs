use std::io;
use std::process;

use tracing::debug;

use psdb::cli::{run, CliError, Printer};
use psdb::config::OutputMode;
use psdb::infrastructure::ServiceContainer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let container = match ServiceContainer::new() {
        Ok(container) => container,
        Err(e) => {
            let error = CliError::from(e);
            Printer::new(
                OutputMode::Human,
                false,
                Box::new(io::stdout()),
                Box::new(io::stderr()),
            )
            .error(&error);
            process::exit(error.exit_code());
        }
    };

    let cancel = container.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            cancel.cancel();
        }
    });

    let code = run(std::env::args_os(), container).await;
    process::exit(code);
}
