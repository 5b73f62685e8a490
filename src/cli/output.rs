//! Terminal output formatting: progress, results and errors
//!
//! Human mode writes formatted text and may draw a spinner on stderr.
//! JSON mode writes exactly one document to stdout and nothing else there.
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::error::{CliError, CliResult};
use crate::config::OutputMode;

const SPINNER_TICK: Duration = Duration::from_millis(100);

/// Emphasize an identifier (database, branch, organization) in human output.
pub fn emphasis(text: &str) -> String {
    text.blue().bold().to_string()
}

/// Result of a successful command, rendered once.
///
/// Carries both renditions; the printer picks one by output mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    message: String,
    document: Value,
}

impl Report {
    /// Report with a human message and a structured payload.
    pub fn new<T: Serialize + ?Sized>(message: impl Into<String>, data: &T) -> CliResult<Self> {
        Ok(Self {
            message: message.into(),
            document: sorted(serde_json::to_value(data)?),
        })
    }

    /// Report whose JSON form is just `{"message": ...}`.
    pub fn message(message: impl Into<String>) -> Self {
        let message = message.into();
        let document = json!({ "message": message.clone() });
        Self { message, document }
    }

    pub fn text(&self) -> &str {
        &self.message
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

/// Rebuild objects with keys in lexicographic order, recursively.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Transient status line. Removed by [`Progress::finish`] or on drop.
///
/// `finish` is idempotent, so a handler may finish early on the success path
/// and still rely on drop for error paths.
#[derive(Debug)]
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn start(message: impl Into<String>, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_message(message.into());
        bar.enable_steady_tick(SPINNER_TICK);
        Self { bar: Some(bar) }
    }

    /// A progress handle that draws nothing (JSON mode).
    pub fn disabled() -> Self {
        Self { bar: None }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.into());
        }
    }

    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }

    /// Remove the status line. Later calls do nothing.
    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Writes results and errors for one invocation.
pub struct Printer {
    mode: OutputMode,
    show_progress: bool,
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
}

impl Printer {
    pub fn new(
        mode: OutputMode,
        show_progress: bool,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            mode,
            show_progress,
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Begin a status line. Never drawn in JSON mode.
    pub fn progress(&self, message: impl Into<String>) -> Progress {
        match self.mode {
            OutputMode::Json => Progress::disabled(),
            OutputMode::Human if self.show_progress => {
                Progress::start(message, ProgressDrawTarget::stderr())
            }
            OutputMode::Human => Progress::start(message, ProgressDrawTarget::hidden()),
        }
    }

    /// Intermediate human-only status text; suppressed in JSON mode.
    pub fn notice(&self, message: &str) {
        if self.mode == OutputMode::Human {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            // best effort: a closed stdout surfaces when the final report is written
            let _ = writeln!(out, "{message}");
        }
    }

    /// Emit the final result.
    pub fn render(&self, report: &Report) -> CliResult<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        match self.mode {
            OutputMode::Json => {
                serde_json::to_writer_pretty(&mut *out, report.document())?;
                writeln!(out).map_err(|e| CliError::io("write output", e))?;
            }
            OutputMode::Human => {
                writeln!(out, "{}", report.text()).map_err(|e| CliError::io("write output", e))?;
            }
        }
        out.flush().map_err(|e| CliError::io("flush output", e))
    }

    /// Print the final error. Human mode uses stderr; JSON mode emits a
    /// document with `kind` and `message` on stdout.
    pub fn error(&self, error: &CliError) {
        match self.mode {
            OutputMode::Json => {
                let doc = sorted(json!({
                    "kind": error.kind(),
                    "message": error.to_string(),
                    "exit_code": error.exit_code(),
                }));
                let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
                if serde_json::to_writer_pretty(&mut *out, &doc).is_ok() {
                    let _ = writeln!(out);
                }
                let _ = out.flush();
            }
            OutputMode::Human => {
                let mut err = self.err.lock().unwrap_or_else(PoisonError::into_inner);
                let _ = writeln!(err, "{}: {}", "error".red().bold(), error);
                let _ = err.flush();
            }
        }
    }
}
