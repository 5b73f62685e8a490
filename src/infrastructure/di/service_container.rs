//! Service container for dependency injection
//!
//! Holds every side-effecting collaborator of one invocation so the
//! dispatcher can be driven end-to-end in tests.

use std::io::{self, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, Resolver};
use crate::infrastructure::http::HttpClientFactory;
use crate::infrastructure::traits::ClientFactory;

/// Container holding the collaborators a command run depends on.
pub struct ServiceContainer {
    /// Reads config files and environment
    pub resolver: Resolver,

    /// Builds API clients from resolved config
    pub clients: Arc<dyn ClientFactory>,

    /// Cancelled on user interrupt; every remote call races it
    pub cancel: CancellationToken,

    /// Primary output stream (results, machine-readable documents)
    pub stdout: Box<dyn Write + Send>,

    /// Diagnostic stream (human-mode errors)
    pub stderr: Box<dyn Write + Send>,

    /// Draw spinners on the terminal in human mode
    pub show_progress: bool,
}

impl ServiceContainer {
    /// Create a container with real implementations for the running process.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self::with_deps(
            Resolver::from_process()?,
            Arc::new(HttpClientFactory),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
        .with_progress(true))
    }

    /// Create a container with custom dependencies (for testing).
    ///
    /// Progress spinners are off; output goes to the given writers.
    pub fn with_deps(
        resolver: Resolver,
        clients: Arc<dyn ClientFactory>,
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            resolver,
            clients,
            cancel: CancellationToken::new(),
            stdout,
            stderr,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Token to cancel from a signal handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
