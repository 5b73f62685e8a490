//! Error normalizer: classifies raw API failures into a closed taxonomy
//!
//! Handlers branch on [`ErrorKind`] only, never on message text. Supporting a
//! new remote error code means touching [`classify`] and nothing else.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::infrastructure::ApiError;

/// Category of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    MalformedResponse,
    Conflict,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified remote failure. Only [`classify`] creates one.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct NormalizedError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: ApiError,
}

impl NormalizedError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw error, kept for diagnostics.
    pub fn cause(&self) -> &ApiError {
        &self.cause
    }

    /// Replace the user-facing message; kind and cause are kept.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Map a raw API failure onto the taxonomy.
///
/// Pure: the kind depends only on the shape of `raw`.
pub fn classify(raw: ApiError) -> NormalizedError {
    let kind = kind_of(&raw);
    let message = default_message(kind, &raw);
    NormalizedError {
        kind,
        message,
        cause: raw,
    }
}

fn kind_of(raw: &ApiError) -> ErrorKind {
    match raw {
        ApiError::Api { status, code, .. } => {
            kind_from_code(code).unwrap_or_else(|| kind_from_status(*status))
        }
        ApiError::Status { status, .. } => kind_from_status(*status),
        ApiError::Malformed { .. } => ErrorKind::MalformedResponse,
        ApiError::Transport(_) | ApiError::Endpoint(_) => ErrorKind::Unknown,
    }
}

fn kind_from_code(code: &str) -> Option<ErrorKind> {
    let kind = match code {
        "not_found" => ErrorKind::NotFound,
        "unauthorized" | "forbidden" | "permission" | "permission_denied" => {
            ErrorKind::Unauthorized
        }
        "conflict" | "already_exists" => ErrorKind::Conflict,
        "response_malformed" => ErrorKind::MalformedResponse,
        _ => return None,
    };
    Some(kind)
}

fn kind_from_status(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        401 | 403 => ErrorKind::Unauthorized,
        409 => ErrorKind::Conflict,
        _ => ErrorKind::Unknown,
    }
}

fn detail(raw: &ApiError) -> String {
    match raw {
        ApiError::Api { code, message, .. } if message.trim().is_empty() => code.clone(),
        ApiError::Api { message, .. } => message.clone(),
        ApiError::Status { body, .. } => body.clone(),
        other => other.to_string(),
    }
}

fn default_message(kind: ErrorKind, raw: &ApiError) -> String {
    match kind {
        ErrorKind::NotFound => format!("not found: {}", detail(raw)),
        ErrorKind::Unauthorized => format!(
            "not authorized: {}; check that your access token is valid for this organization",
            detail(raw)
        ),
        ErrorKind::MalformedResponse => format!(
            "unexpected API response received; please retry, and report a bug if it keeps happening ({})",
            raw
        ),
        ErrorKind::Conflict => format!("conflict: {}", detail(raw)),
        ErrorKind::Unknown => raw.to_string(),
    }
}
