//! Per-invocation state handed to every command handler

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::application::{classify, poll_until, ErrorKind, PollOutcome, PollPolicy};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output::Printer;
use crate::config::{EffectiveConfig, Field, Resolver};
use crate::infrastructure::{new_client, ApiResult, ClientFactory, PlatformApi};

/// Resolved settings plus the collaborators a handler may use.
///
/// Built once by the dispatcher after validation; handlers only borrow it.
pub struct Context {
    config: EffectiveConfig,
    resolver: Resolver,
    printer: Printer,
    clients: Arc<dyn ClientFactory>,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(
        config: EffectiveConfig,
        resolver: Resolver,
        printer: Printer,
        clients: Arc<dyn ClientFactory>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            resolver,
            printer,
            clients,
            cancel,
        }
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn printer(&self) -> &Printer {
        &self.printer
    }

    pub fn org(&self) -> CliResult<&str> {
        Ok(self.config.require(Field::Organization)?)
    }

    pub fn database(&self) -> CliResult<&str> {
        Ok(self.config.require(Field::Database)?)
    }

    /// Authenticated API client. No network I/O happens here.
    pub fn client(&self) -> CliResult<Arc<dyn PlatformApi>> {
        Ok(new_client(&self.config, self.clients.as_ref())?)
    }

    /// Run one remote call, racing it against cancellation.
    /// Failures come back classified.
    pub async fn call<T, F>(&self, request: F) -> CliResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(CliError::Interrupted);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("remote call cancelled");
                Err(CliError::Interrupted)
            }
            result = request => result.map_err(|e| CliError::Remote(classify(e))),
        }
    }

    /// Poll `probe` under `policy` until `done` accepts a value.
    pub async fn poll<T, F, Fut, D>(
        &self,
        policy: PollPolicy,
        mut probe: F,
        done: D,
    ) -> CliResult<PollOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
        D: Fn(&T) -> bool,
    {
        poll_until(
            policy,
            &self.cancel,
            || {
                let request = probe();
                async move { request.await.map_err(classify) }
            },
            done,
        )
        .await
        .map_err(CliError::Remote)
    }
}

/// Replace the message of a remote error of `kind`; other errors pass through.
///
/// ```ignore
/// ctx.call(api.get_branch(org, db, branch))
///     .await
///     .map_err(reword(ErrorKind::NotFound, || format!("branch {branch} does not exist")))?;
/// ```
pub fn reword<M>(kind: ErrorKind, message: M) -> impl FnOnce(CliError) -> CliError
where
    M: FnOnce() -> String,
{
    move |err| match err {
        CliError::Remote(e) if e.is(kind) => CliError::Remote(e.with_message(message())),
        other => other,
    }
}
